use ampliar::cli::{Cli, Command};
use ampliar::error::Result;
use ampliar::logger::RunLogger;
use ampliar::solver::{train_teacher, Solver};
use clap::Parser;

fn main() {
    if let Err(e) = run() {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Command::Train(args) => {
            let config = args.resolve()?;
            let logger = RunLogger::with_file(&config.log_path())?;
            let mut solver = Solver::new(config, logger)?;
            solver.run()
        }
        Command::Eval(args) => {
            let config = args.run.resolve()?;
            let logger = RunLogger::with_file(&config.log_path())?;
            let mut solver = Solver::for_eval(config, logger)?;
            solver.evaluate_only(&args.checkpoint)?;
            Ok(())
        }
        Command::InitTeacher(args) => {
            let config = args.run.resolve()?;
            let out = args
                .out
                .unwrap_or_else(|| config.output_dir.join("teacher.safetensors"));
            let mut logger = RunLogger::with_file(&config.log_path())?;
            train_teacher(&config, &mut logger, &out)
        }
    }
}
