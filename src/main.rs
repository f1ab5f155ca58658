fn main() {
    if let Err(error) = daycal::run() {
        eprintln!("daycal: {error}");
        std::process::exit(1);
    }
}
