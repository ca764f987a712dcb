mod cli;
mod core;
mod pipeline;
mod plot;
mod report;

fn main() -> anyhow::Result<()> {
    cli::run::entry()
}
