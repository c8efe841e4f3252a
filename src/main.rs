use anyhow::Result;
use clap::Parser;

use flowcanvas::cli::{
    ConvertArgs, ImpactArgs, InspectArgs, run_convert, run_impact, run_inspect,
};

fn main() {
    if let Err(err) = dispatch() {
        eprintln!("\u{001b}[31merror:\u{001b}[0m {err:?}");
        std::process::exit(1);
    }
}

fn dispatch() -> Result<()> {
    let args: Vec<String> = std::env::args().collect();
    match args.get(1).map(|s| s.as_str()) {
        Some("impact") => {
            let impact_args = ImpactArgs::parse_from(
                std::iter::once(args[0].clone()).chain(args.iter().skip(2).cloned()),
            );
            run_impact(impact_args)
        }
        Some("inspect") => {
            let inspect_args = InspectArgs::parse_from(
                std::iter::once(args[0].clone()).chain(args.iter().skip(2).cloned()),
            );
            run_inspect(inspect_args)
        }
        Some("convert") => {
            let convert_args = ConvertArgs::parse_from(
                std::iter::once(args[0].clone()).chain(args.iter().skip(2).cloned()),
            );
            run_convert(convert_args)
        }
        _ => {
            let convert_args = ConvertArgs::parse_from(args);
            run_convert(convert_args)
        }
    }
}
