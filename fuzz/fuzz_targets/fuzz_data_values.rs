#![no_main]
use geoipd::data_section::DataDecoder;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if data.is_empty() {
        return;
    }

    // First byte picks a start offset, the rest is the data section
    let offset = data[0] as u32;
    let decoder = DataDecoder::new(&data[1..]);
    let _ = decoder.decode(offset);
    let _ = decoder.decode_unresolved(offset);
    let _ = decoder.decode(0);
});
