fn main() {
    if let Err(err) = sheet_mapper::run() {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}
