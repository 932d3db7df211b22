fn main() {
    if let Err(e) = digiscan_lib::run() {
        eprintln!("digiscan: {:#}", e);
        std::process::exit(1);
    }
}
