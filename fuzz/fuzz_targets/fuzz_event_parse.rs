#![no_main]

use libfuzzer_sys::fuzz_target;
use chatledger::fuzz_api::parse_webhook_body;

fuzz_target!(|data: &[u8]| {
    let _ = parse_webhook_body(data);
});
