/*
 * Released under the terms of the Apache 2.0 license with LLVM
 * exception. See `LICENSE` for details.
 */

#![no_main]
use iloc_regalloc::frontend;
use iloc_regalloc::fuzzing::fuzz_target;
use iloc_regalloc::RegNames;

// Arbitrary text must either parse or be rejected with diagnostics;
// anything that parses must print and parse back the same way.
fuzz_target!(|src: &str| {
    let _ = env_logger::try_init();
    match frontend::parse(src) {
        Ok(block) => {
            let text = block.display(RegNames::Source).to_string();
            let again = frontend::parse(&text).expect("printed block does not parse");
            assert_eq!(again.display(RegNames::Source).to_string(), text);
        }
        Err(errors) => {
            assert!(!errors.errors().is_empty());
            log::trace!("{}", errors);
        }
    }
});
