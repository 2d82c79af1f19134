#![no_main]
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if data.len() > 65536 {
        return;
    }
    // Arbitrary bytes must decode cleanly or report Corrupt; never panic.
    let _ = tiercache::disk::record::decode(data);
});
