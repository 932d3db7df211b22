//! Collection database schema
//!
//! CREATE statements for every table plus the ordered migration list.

/// Current schema version
pub const SCHEMA_VERSION: i32 = 4;

/// Initial schema SQL (always the latest layout)
pub const INIT_SCHEMA: &str = r#"
-- Storage volumes / mount points registered as collection locations
CREATE TABLE IF NOT EXISTS AlbumRoots (
    id              INTEGER PRIMARY KEY AUTOINCREMENT,
    label           TEXT,
    status          INTEGER NOT NULL DEFAULT 0,
    type            INTEGER NOT NULL,
    identifier      TEXT,
    specificPath    TEXT,
    UNIQUE(identifier, specificPath)
);

-- Directories below an album root (albumRoot = 0 marks a stale album)
CREATE TABLE IF NOT EXISTS Albums (
    id              INTEGER PRIMARY KEY AUTOINCREMENT,
    albumRoot       INTEGER NOT NULL,
    relativePath    TEXT NOT NULL,
    date            TEXT,
    caption         TEXT,
    collection      TEXT,
    icon            INTEGER,
    UNIQUE(albumRoot, relativePath)
);

-- Files inside albums
CREATE TABLE IF NOT EXISTS Images (
    id               INTEGER PRIMARY KEY AUTOINCREMENT,
    album            INTEGER REFERENCES Albums(id) ON DELETE CASCADE,
    name             TEXT NOT NULL,
    status           INTEGER NOT NULL,
    category         INTEGER NOT NULL,
    modificationDate TEXT,
    fileSize         INTEGER,
    uniqueHash       TEXT
);

CREATE TABLE IF NOT EXISTS ImageInformation (
    imageid           INTEGER PRIMARY KEY REFERENCES Images(id) ON DELETE CASCADE,
    rating            INTEGER,
    creationDate      TEXT,
    digitizationDate  TEXT,
    orientation       INTEGER,
    width             INTEGER,
    height            INTEGER,
    format            TEXT,
    colorDepth        INTEGER,
    colorModel        INTEGER
);

CREATE TABLE IF NOT EXISTS ImageMetadata (
    imageid           INTEGER PRIMARY KEY REFERENCES Images(id) ON DELETE CASCADE,
    make              TEXT,
    model             TEXT,
    lens              TEXT,
    aperture          REAL,
    focalLength       REAL,
    focalLength35     REAL,
    exposureTime      REAL,
    exposureProgram   INTEGER,
    exposureMode      INTEGER,
    sensitivity       INTEGER,
    flash             INTEGER,
    whiteBalance      INTEGER,
    meteringMode      INTEGER,
    subjectDistance   REAL
);

CREATE TABLE IF NOT EXISTS ImagePositions (
    imageid           INTEGER PRIMARY KEY REFERENCES Images(id) ON DELETE CASCADE,
    latitudeNumber    REAL,
    longitudeNumber   REAL,
    altitude          REAL,
    orientation       REAL,
    tilt              REAL,
    roll              REAL,
    accuracy          REAL,
    description       TEXT
);

CREATE TABLE IF NOT EXISTS ImageComments (
    id                INTEGER PRIMARY KEY AUTOINCREMENT,
    imageid           INTEGER NOT NULL REFERENCES Images(id) ON DELETE CASCADE,
    type              INTEGER NOT NULL,
    language          TEXT NOT NULL,
    author            TEXT,
    date              TEXT,
    comment           TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS ImageCopyright (
    id                INTEGER PRIMARY KEY AUTOINCREMENT,
    imageid           INTEGER NOT NULL REFERENCES Images(id) ON DELETE CASCADE,
    property          TEXT NOT NULL,
    value             TEXT NOT NULL,
    extraValue        TEXT,
    UNIQUE(imageid, property, value, extraValue)
);

CREATE TABLE IF NOT EXISTS ImageProperties (
    imageid           INTEGER NOT NULL REFERENCES Images(id) ON DELETE CASCADE,
    property          TEXT NOT NULL,
    value             TEXT NOT NULL,
    UNIQUE(imageid, property)
);

-- Tag forest (pid = 0 for top level tags)
CREATE TABLE IF NOT EXISTS Tags (
    id                INTEGER PRIMARY KEY AUTOINCREMENT,
    pid               INTEGER NOT NULL DEFAULT 0,
    name              TEXT NOT NULL,
    icon              INTEGER,
    iconkde           TEXT,
    UNIQUE(name, pid)
);

-- Ancestor closure of Tags: one row per (tag, ancestor)
CREATE TABLE IF NOT EXISTS TagsTree (
    id                INTEGER NOT NULL,
    pid               INTEGER NOT NULL,
    UNIQUE(id, pid)
);

CREATE TABLE IF NOT EXISTS ImageTags (
    imageid           INTEGER NOT NULL REFERENCES Images(id) ON DELETE CASCADE,
    tagid             INTEGER NOT NULL REFERENCES Tags(id) ON DELETE CASCADE,
    UNIQUE(imageid, tagid)
);

CREATE TABLE IF NOT EXISTS Searches (
    id                INTEGER PRIMARY KEY AUTOINCREMENT,
    type              INTEGER NOT NULL,
    name              TEXT NOT NULL,
    query             TEXT NOT NULL,
    UNIQUE(type, name)
);

CREATE TABLE IF NOT EXISTS Settings (
    keyword           TEXT NOT NULL UNIQUE,
    value             TEXT
);

CREATE TABLE IF NOT EXISTS schema_version (
    version           INTEGER PRIMARY KEY,
    applied_at        TEXT NOT NULL
);

-- Indexes
CREATE INDEX IF NOT EXISTS dir_index ON Images(album);
CREATE INDEX IF NOT EXISTS hash_index ON Images(uniqueHash);
CREATE UNIQUE INDEX IF NOT EXISTS visible_name_index ON Images(album, name) WHERE status = 1;
CREATE INDEX IF NOT EXISTS tag_index ON ImageTags(tagid);
CREATE INDEX IF NOT EXISTS tag_id_index ON ImageTags(imageid);
CREATE INDEX IF NOT EXISTS comments_imageid_index ON ImageComments(imageid);
CREATE INDEX IF NOT EXISTS copyright_imageid_index ON ImageCopyright(imageid);
CREATE INDEX IF NOT EXISTS creationdate_index ON ImageInformation(creationDate);
CREATE INDEX IF NOT EXISTS tagstree_pid_index ON TagsTree(pid);
"#;

/// Triggers: album root deletion cascade and the TagsTree closure
pub const TRIGGER_SCHEMA: &str = r#"
CREATE TRIGGER IF NOT EXISTS delete_albumroot DELETE ON AlbumRoots
BEGIN
    DELETE FROM Albums WHERE albumRoot = OLD.id;
END;

CREATE TRIGGER IF NOT EXISTS insert_tagstree AFTER INSERT ON Tags
BEGIN
    INSERT INTO TagsTree
        SELECT NEW.id, NEW.pid
        UNION
        SELECT NEW.id, pid FROM TagsTree WHERE id = NEW.pid;
END;

CREATE TRIGGER IF NOT EXISTS delete_tagstree DELETE ON Tags
BEGIN
    DELETE FROM Tags WHERE id IN (SELECT id FROM TagsTree WHERE pid = OLD.id);
    DELETE FROM TagsTree WHERE id IN (SELECT id FROM TagsTree WHERE pid = OLD.id);
    DELETE FROM TagsTree WHERE id = OLD.id;
END;

CREATE TRIGGER IF NOT EXISTS move_tagstree UPDATE OF pid ON Tags
BEGIN
    DELETE FROM TagsTree
        WHERE ((id = OLD.id) OR id IN (SELECT id FROM TagsTree WHERE pid = OLD.id))
          AND pid IN (SELECT pid FROM TagsTree WHERE id = OLD.id);
    INSERT INTO TagsTree
        SELECT NEW.id, NEW.pid
        UNION
        SELECT NEW.id, pid FROM TagsTree WHERE id = NEW.pid
        UNION
        SELECT id, NEW.pid FROM TagsTree WHERE pid = NEW.id
        UNION
        SELECT A.id, B.pid FROM TagsTree A, TagsTree B
            WHERE A.pid = NEW.id AND B.id = NEW.pid;
END;
"#;

/// Default file suffix filters, stored in Settings on creation.
pub const DEFAULT_IMAGE_FORMATS: &str =
    "jpg;jpeg;jpe;png;gif;bmp;tif;tiff;webp;heic;heif;jp2;pgm;ppm;pnm;xpm;tga;\
     raw;dng;cr2;cr3;crw;nef;nrw;arw;srf;sr2;orf;rw2;pef;srw;raf;x3f;mrw;kdc;dcr;erf;3fr;mos";
pub const DEFAULT_VIDEO_FORMATS: &str = "mpeg;mpg;mpo;mpe;avi;mov;wmf;asf;mp4;3gp;wmv;mkv;webm;mts;m2ts";
pub const DEFAULT_AUDIO_FORMATS: &str = "ogg;mp3;wma;wav;flac;m4a;aac";

/// Migration script
pub struct Migration {
    pub version: i32,
    pub description: &'static str,
    pub sql: &'static str,
}

/// All migrations, ordered by version
pub const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 2,
        description: "Add saved searches table",
        sql: r#"
            CREATE TABLE IF NOT EXISTS Searches (
                id      INTEGER PRIMARY KEY AUTOINCREMENT,
                type    INTEGER NOT NULL,
                name    TEXT NOT NULL,
                query   TEXT NOT NULL,
                UNIQUE(type, name)
            );
        "#,
    },
    Migration {
        version: 3,
        description: "Index unique hashes and enforce unique visible names per album",
        sql: r#"
            CREATE INDEX IF NOT EXISTS hash_index ON Images(uniqueHash);
            CREATE UNIQUE INDEX IF NOT EXISTS visible_name_index ON Images(album, name) WHERE status = 1;
        "#,
    },
    Migration {
        version: 4,
        description: "Add GPS accuracy and description columns",
        sql: r#"
            ALTER TABLE ImagePositions ADD COLUMN accuracy REAL;
            ALTER TABLE ImagePositions ADD COLUMN description TEXT;
        "#,
    },
];
