use clap::Parser;

use schedule_xformer::config::CliArgs;

fn main() {
    let cli = CliArgs::parse();
    if let Err(err) = schedule_xformer::run(cli) {
        eprintln!("schedule transform failed: {}", err);
        std::process::exit(1);
    }
}
