use clap::Parser;

fn main() {
    let options = playerai_lib::RunOptions::parse();
    if let Err(err) = playerai_lib::run(options) {
        eprintln!("playerai: {err:#}");
        std::process::exit(1);
    }
}
