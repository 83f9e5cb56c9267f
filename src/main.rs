fn main() {
    if let Err(e) = roofmate::run() {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}
