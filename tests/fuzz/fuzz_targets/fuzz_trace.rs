#![no_main]
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    // Parsing and aggregating must not panic, and accepted traces must stay
    // within their line counts.
    if let Ok(trace) = twcov::ingest::parse_trace(data) {
        if let Ok(files) = twcov::aggregate::aggregate_trace(&trace) {
            for file in &files {
                assert!(file.covered_line_count <= file.line_count);
                assert!(file.validate(true).is_ok());
            }
        }
    }
});
