fn main() {
    if let Err(err) = diagram_layout_engine::run() {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}
