#![no_main]

use libfuzzer_sys::fuzz_target;
use vigil_diagnostics::DiagnosticRecord;

fuzz_target!(|data: &[u8]| {
    let raw = String::from_utf8_lossy(data);
    for line in raw.lines() {
        if let Ok(record) = DiagnosticRecord::parse_line(line) {
            let rendered = record.render_line();
            let reparsed = DiagnosticRecord::parse_line(&rendered).expect("rendered line parses");
            assert_eq!(reparsed, record);
        }
    }
});
