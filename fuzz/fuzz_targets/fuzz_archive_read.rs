#![no_main]

use std::io::Write;

use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    // Never panic / hang on arbitrary bytes, in memory or on disk.
    let _ = qgen_archive::entries_from_bytes(data);

    let mut tmp = tempfile::Builder::new()
        .prefix("fuzz_archive_read")
        .suffix(".zip")
        .tempfile()
        .expect("failed to create tempfile");
    tmp.write_all(data).expect("failed to write zip bytes");
    tmp.flush().expect("failed to flush zip bytes");

    let archive = qgen_archive::Archive::new(tmp.path());
    let _ = archive.names();
    let _ = archive.read("transformer.py");
    let _ = archive.read("query.cxx");
});
