#![no_main]

use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let _ = wordvec_core::fuzz_read_cache_header(data);
});
