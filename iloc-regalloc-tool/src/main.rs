use std::fmt::Display;
use std::path::PathBuf;
use std::process;

use clap::Parser;
use iloc_regalloc::{checker::Checker, frontend, rename, Block, RegNames, RegallocOptions};

#[derive(Parser)]
#[clap(group(
    clap::ArgGroup::new("mode")
        .required(false)
        .args(["scan", "parse", "ir", "rename", "num_regs"])
))]
/// Scanner, parser, renamer and local register allocator for ILOC.
///
/// With no mode flag the file is only parsed (`-p`).
struct Args {
    /// Print the tokens of the input.
    #[clap(short = 's')]
    scan: bool,

    /// Parse the input and report success or errors.
    #[clap(short = 'p')]
    parse: bool,

    /// Print the intermediate representation as an operand table.
    #[clap(short = 'r')]
    ir: bool,

    /// Rename the block and print it with virtual registers.
    #[clap(short = 'x')]
    rename: bool,

    /// Allocate the block to K physical registers and print the result.
    #[clap(
        short = 'k',
        value_name = "K",
        value_parser = clap::value_parser!(u32).range(3..=64)
    )]
    num_regs: Option<u32>,

    /// Print allocation statistics to stderr and check the allocated
    /// code.
    #[clap(short = 'v')]
    verbose: bool,

    /// Near-tie window, in instructions, when choosing a register to
    /// evict.
    #[clap(long, default_value_t = 1)]
    victim_window: u32,

    /// Address of the first spill slot.
    #[clap(long, default_value_t = 32768)]
    spill_base: u32,

    /// Input file containing one ILOC block.
    input: PathBuf,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Mode {
    Scan,
    Parse,
    Ir,
    Rename,
    Allocate(usize),
}

impl Args {
    /// The selected mode. At most one mode flag is accepted.
    fn mode(&self) -> Mode {
        if self.parse {
            Mode::Parse
        } else if self.scan {
            Mode::Scan
        } else if self.ir {
            Mode::Ir
        } else if self.rename {
            Mode::Rename
        } else if let Some(k) = self.num_regs {
            Mode::Allocate(k as usize)
        } else {
            Mode::Parse
        }
    }
}

fn fail(msg: impl Display) -> ! {
    eprintln!("ERROR: {}", msg);
    process::exit(1);
}

/// Parses `src`, or reports every diagnostic and exits.
fn parse_or_exit(src: &str, epilogue: &str) -> Block {
    match frontend::parse(src) {
        Ok(block) => block,
        Err(errors) => {
            eprint!("{}", errors);
            eprintln!("{}", epilogue);
            process::exit(1);
        }
    }
}

fn scan(src: &str) {
    let mut scanner = frontend::Scanner::new(src);
    let mut had_errors = false;
    while let Some(tok) = scanner.next() {
        for err in scanner.take_errors() {
            eprintln!("{}", err);
            had_errors = true;
        }
        println!("{}", tok);
    }
    if had_errors {
        process::exit(1);
    }
}

fn allocate(mut block: Block, num_regs: usize, args: &Args) {
    let options = RegallocOptions {
        verbose_log: args.verbose,
        victim_window: args.victim_window,
        spill_base: args.spill_base,
    };
    let output = match iloc_regalloc::run(&mut block, num_regs, &options) {
        Ok(output) => output,
        Err(e) => fail(e),
    };
    print!("{}", block.display(RegNames::Physical));

    if args.verbose {
        let stats = &output.stats;
        eprintln!("usable registers: {}", output.usable_regs);
        match output.addr_reg {
            Some(preg) => eprintln!("spill address register: r{}", preg.hw_enc()),
            None => eprintln!("spill address register: none"),
        }
        eprintln!("spill slots: {}", output.num_spillslots);
        eprintln!(
            "evictions: {}, stores: {}, restores: {}, rematerializations: {}",
            stats.evictions, stats.spill_stores, stats.restores, stats.remats
        );
        eprintln!("inserted instructions: {}", stats.inserted_insts);
        if let Err(e) = Checker::new(&block, &output).run() {
            fail(format_args!("register allocation checker failed: {}", e));
        }
    }
}

fn main() {
    pretty_env_logger::init();
    let args = Args::parse();

    let src = match std::fs::read_to_string(&args.input) {
        Ok(src) => src,
        Err(e) => fail(format_args!("could not read {}: {}", args.input.display(), e)),
    };

    match args.mode() {
        Mode::Scan => scan(&src),
        Mode::Parse => {
            let block = parse_or_exit(&src, "Parse found errors.");
            println!("Parse succeeded. Processed {} operations.", block.len());
        }
        Mode::Ir => {
            let block = parse_or_exit(&src, "\nDue to the syntax error, run terminates.");
            print!("{}", block.display_table());
        }
        Mode::Rename => {
            let mut block = parse_or_exit(&src, "\nDue to the syntax error, run terminates.");
            let renamed = rename::rename(&mut block);
            log::debug!(
                "{} virtual registers, MaxLive {}",
                renamed.num_vregs,
                renamed.max_live
            );
            print!("{}", block.display(RegNames::Virtual));
        }
        Mode::Allocate(k) => {
            let block = parse_or_exit(&src, "\nDue to the syntax error, run terminates.");
            log::debug!("allocating with {} registers", k);
            allocate(block, k, &args);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mode(args: &[&str]) -> Result<Mode, clap::Error> {
        let argv = std::iter::once("ilocalloc").chain(args.iter().copied());
        Args::try_parse_from(argv).map(|args| args.mode())
    }

    #[test]
    fn mode_selection() {
        assert_eq!(mode(&["f.i"]).unwrap(), Mode::Parse);
        assert_eq!(mode(&["-p", "f.i"]).unwrap(), Mode::Parse);
        assert_eq!(mode(&["-s", "f.i"]).unwrap(), Mode::Scan);
        assert_eq!(mode(&["-r", "f.i"]).unwrap(), Mode::Ir);
        assert_eq!(mode(&["-x", "f.i"]).unwrap(), Mode::Rename);
        assert_eq!(mode(&["-k", "5", "f.i"]).unwrap(), Mode::Allocate(5));
        assert_eq!(mode(&["-v", "-k", "3", "f.i"]).unwrap(), Mode::Allocate(3));
    }

    #[test]
    fn modes_conflict() {
        assert!(mode(&["-s", "-p", "f.i"]).is_err());
        assert!(mode(&["-p", "-k", "4", "f.i"]).is_err());
        assert!(mode(&["-r", "-x", "f.i"]).is_err());
    }

    #[test]
    fn register_count_range() {
        assert!(mode(&["-k", "2", "f.i"]).is_err());
        assert!(mode(&["-k", "65", "f.i"]).is_err());
        assert_eq!(mode(&["-k", "64", "f.i"]).unwrap(), Mode::Allocate(64));
    }

    #[test]
    fn input_is_required() {
        assert!(mode(&["-p"]).is_err());
    }
}
