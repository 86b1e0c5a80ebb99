fn main() {
    if let Err(e) = canmon_lib::run() {
        eprintln!("canmon: {}", e);
        std::process::exit(1);
    }
}
