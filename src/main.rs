fn main() {
    if let Err(e) = histq::main_inner() {
        eprintln!("histq: {e:#}");
        std::process::exit(1);
    }
}
