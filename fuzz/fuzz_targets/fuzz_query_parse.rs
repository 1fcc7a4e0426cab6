#![no_main]

mod utils;

use libfuzzer_sys::fuzz_target;
use qgen_cache::Fingerprint;

fuzz_target!(|data: &[u8]| {
    let Some(text) = utils::truncate_utf8(data) else {
        return;
    };
    let Ok(module) = qgen_ast::parse(text) else {
        return;
    };

    // Canonical text must re-parse to the same expression, so its key is stable.
    for statement in &module.body {
        let canonical = statement.value.canonical_text();
        let reparsed = qgen_ast::parse(&canonical).expect("canonical text must parse");
        assert_eq!(reparsed.body.len(), 1);
        assert_eq!(reparsed.body[0].value, statement.value);
        assert_eq!(
            Fingerprint::for_expr(&reparsed.body[0].value),
            Fingerprint::for_expr(&statement.value)
        );
        let _ = qgen_ast::find_dataset(&statement.value).map(qgen_ast::extract_dataset_info);
    }
});
