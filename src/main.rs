fn main() {
    use clap::Parser;
    use std::error::Error;
    let args = storyfetch::cli::Args::parse();
    storyfetch::cli::init_logging(args.quiet, args.verbose);
    if let Err(e) = storyfetch::cli::run(&args) {
        eprintln!("{}", e);
        if args.verbose {
            let mut source = e.source();
            while let Some(s) = source {
                eprintln!("  cause: {}", s);
                source = s.source();
            }
        }
        std::process::exit(e.exit_code());
    }
}
