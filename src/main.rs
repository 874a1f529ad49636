use std::process;

fn main() {
    if let Err(err) = ph_pulse::app::run() {
        eprintln!("fatal: {err:#}");
        process::exit(1);
    }
}
