#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use chatledger::fuzz_api::validate_line_signature;

#[derive(Arbitrary, Debug)]
struct Input {
    secret: String,
    signature: String,
    body: Vec<u8>,
}

fuzz_target!(|input: Input| {
    let ok = validate_line_signature(&input.secret, &input.signature, &input.body);
    if input.signature.is_empty() {
        assert!(!ok);
    }
});
