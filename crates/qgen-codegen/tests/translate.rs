use std::collections::BTreeSet;
use std::path::Path;

use qgen_archive::{entries_from_bytes, Archive, ArchiveLayout};
use qgen_ast::Expr;
use qgen_codegen::{
    ArtifactDescriptor, AstTranslator, BackendKind, CodeGenerator, GenerateError, TranslateError,
};

const SELECT_PT: &str =
    "(call (attr (call EventDataset 'localds://a') 'Select') (lambda (list e) (attr e 'pt')))";

fn names(archive: &[u8]) -> BTreeSet<String> {
    entries_from_bytes(archive).unwrap().into_keys().collect()
}

#[test]
fn uproot_translation_is_cached_between_requests() {
    let cache = tempfile::tempdir().unwrap();
    let translator = AstTranslator::new("uproot").unwrap();

    let first = translator
        .translate_text_ast_to_zip("expr1", cache.path())
        .unwrap();
    let second = translator
        .translate_text_ast_to_zip("expr1", cache.path())
        .unwrap();

    assert_eq!(translator.generator_invocations(), 1);
    assert_eq!(names(&first), names(&second));
    assert_eq!(names(&first), BTreeSet::from(["transformer.py".to_string()]));

    let entries = entries_from_bytes(&first).unwrap();
    let source = String::from_utf8(entries["transformer.py"].clone()).unwrap();
    assert!(source.contains("return expr1\n"));
}

#[test]
fn empty_request_fails_without_touching_the_cache() {
    let cache = tempfile::tempdir().unwrap();
    let translator = AstTranslator::new("uproot").unwrap();
    let err = translator
        .translate_text_ast_to_zip("", cache.path())
        .unwrap_err();
    assert!(matches!(err, TranslateError::EmptyRequest));
    assert_eq!(translator.generator_invocations(), 0);
    assert_eq!(std::fs::read_dir(cache.path()).unwrap().count(), 0);
}

#[test]
fn invalid_backend_fails_at_construction() {
    let err = AstTranslator::new("invalid-backend").unwrap_err();
    assert!(matches!(err, TranslateError::Configuration { .. }));
    assert!(err.to_string().contains("invalid-backend"));
}

#[test]
fn xaod_translation_ships_sources_and_runner() {
    let cache = tempfile::tempdir().unwrap();
    let translator = AstTranslator::new("xAOD").unwrap();
    let translation = translator.translate(SELECT_PT, cache.path()).unwrap();

    assert_eq!(translation.descriptor.backend, BackendKind::Xaod);
    assert_eq!(
        names(&translation.archive),
        BTreeSet::from([
            "query.cxx".to_string(),
            "query.h".to_string(),
            "runner.sh".to_string()
        ])
    );
    let dataset = translation.dataset.unwrap();
    assert_eq!(dataset.urls, vec!["localds://a"]);
    assert_eq!(dataset.tree_name, None);
}

#[test]
fn archives_are_reproducible_across_cache_roots() {
    let translator = AstTranslator::new("xAOD").unwrap();
    let a = tempfile::tempdir().unwrap();
    let b = tempfile::tempdir().unwrap();
    let first = translator.translate_text_ast_to_zip(SELECT_PT, a.path()).unwrap();
    let second = translator.translate_text_ast_to_zip(SELECT_PT, b.path()).unwrap();
    assert_eq!(first, second);
}

#[test]
fn archive_can_be_read_back_from_disk() {
    let cache = tempfile::tempdir().unwrap();
    let out = tempfile::tempdir().unwrap();
    let bytes = AstTranslator::new("uproot")
        .unwrap()
        .translate_text_ast_to_zip(SELECT_PT, cache.path())
        .unwrap();
    let path = out.path().join("joined.zip");
    std::fs::write(&path, bytes).unwrap();

    let archive = Archive::new(&path);
    assert_eq!(archive.names().unwrap(), vec!["transformer.py"]);
    let source = archive.read("transformer.py").unwrap().unwrap();
    assert!(String::from_utf8(source)
        .unwrap()
        .contains("EventDataset('localds://a').Select((lambda e: e.pt))"));
}

/// Writes files in nested directories, two of them sharing a base name.
struct NestedGenerator;

impl CodeGenerator for NestedGenerator {
    fn kind(&self) -> BackendKind {
        BackendKind::Uproot
    }

    fn generate(&self, _expr: &Expr, output_dir: &Path) -> Result<ArtifactDescriptor, GenerateError> {
        let io = |path: &Path, source| GenerateError::Io {
            path: path.to_path_buf(),
            source,
        };
        for rel in ["a/main.py", "b/main.py", "top.py"] {
            let path = output_dir.join(rel);
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent).map_err(|err| io(parent, err))?;
            }
            std::fs::write(&path, rel).map_err(|err| io(&path, err))?;
        }
        Ok(ArtifactDescriptor {
            backend: BackendKind::Uproot,
            files: vec![
                "a/main.py".to_string(),
                "b/main.py".to_string(),
                "top.py".to_string(),
            ],
            main_script: Some("top.py".to_string()),
        })
    }
}

#[test]
fn flat_layout_keeps_first_of_colliding_names() {
    let cache = tempfile::tempdir().unwrap();
    let bytes = AstTranslator::with_generator(NestedGenerator)
        .translate_text_ast_to_zip("(q)", cache.path())
        .unwrap();
    let entries = entries_from_bytes(&bytes).unwrap();
    assert_eq!(entries.len(), 2);
    assert_eq!(entries["main.py"], b"a/main.py");
    assert_eq!(entries["top.py"], b"top.py");
}

#[test]
fn relative_layout_keeps_directories() {
    let cache = tempfile::tempdir().unwrap();
    let bytes = AstTranslator::with_generator(NestedGenerator)
        .with_layout(ArchiveLayout::Relative)
        .translate_text_ast_to_zip("(q)", cache.path())
        .unwrap();
    assert_eq!(
        names(&bytes),
        BTreeSet::from([
            "a/main.py".to_string(),
            "b/main.py".to_string(),
            "top.py".to_string()
        ])
    );
}

#[derive(Clone, Default)]
struct CapturedLogs(std::sync::Arc<std::sync::Mutex<Vec<u8>>>);

impl std::io::Write for CapturedLogs {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

#[test]
fn flat_collision_and_cache_events_are_logged() {
    let logs = CapturedLogs::default();
    let writer = logs.clone();
    let subscriber = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_ansi(false)
        .with_writer(move || writer.clone())
        .finish();

    let cache = tempfile::tempdir().unwrap();
    tracing::subscriber::with_default(subscriber, || {
        let translator = AstTranslator::with_generator(NestedGenerator);
        translator.translate("(q)", cache.path()).unwrap();
        translator.translate("(q)", cache.path()).unwrap();
    });

    let output = String::from_utf8(logs.0.lock().unwrap().clone()).unwrap();
    assert!(output.contains("cache miss"), "{output}");
    assert!(output.contains("cache hit"), "{output}");
    assert!(
        output.contains("dropping file whose archive entry name is already taken"),
        "{output}"
    );
}
