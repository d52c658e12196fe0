fn main() {
    if let Err(e) = docxtract_lib::run() {
        eprintln!("{}", e);
        std::process::exit(1);
    }
}
