//! File registry behavior against a real directory tree.

use proptest::prelude::*;
use songloader::registry::{FileRegistry, ListRow, NO_FILES_PLACEHOLDER};
use songloader::utils::AppConfig;
use std::collections::BTreeSet;
use std::path::PathBuf;
use tempfile::TempDir;

fn block_on<F: std::future::Future>(future: F) -> F::Output {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap()
        .block_on(future)
}

#[tokio::test]
async fn empty_directories_show_the_placeholder() {
    let temp = TempDir::new().unwrap();
    let registry = FileRegistry::new(temp.path().join("downloads"), temp.path().join("converted"));

    let rows = registry.refresh().await.unwrap();

    assert_eq!(rows, vec![ListRow::Placeholder]);
    assert_eq!(rows[0].to_string(), NO_FILES_PLACEHOLDER);
    assert!(registry.is_empty());
    assert!(temp.path().join("downloads").is_dir());
    assert!(temp.path().join("converted").is_dir());
}

#[tokio::test]
async fn registry_follows_config_directories() {
    let temp = TempDir::new().unwrap();
    let config = AppConfig {
        output_dir: temp.path().join("out"),
        converted_dir: temp.path().join("conv"),
        ..AppConfig::default()
    };
    std::fs::create_dir_all(temp.path().join("conv")).unwrap();
    std::fs::write(temp.path().join("conv/song.flac"), b"x").unwrap();

    let registry = FileRegistry::from_config(&config);
    let rows = registry.refresh().await.unwrap();

    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].to_string(), "song.flac");
    assert_eq!(registry.output_dir(), temp.path().join("out"));
}

#[tokio::test]
async fn deleted_files_drop_out_of_the_selection() {
    let temp = TempDir::new().unwrap();
    let out = temp.path().join("downloads");
    std::fs::create_dir_all(&out).unwrap();
    for name in ["a.mp3", "b.mp3", "c.mp3"] {
        std::fs::write(out.join(name), b"x").unwrap();
    }
    let registry = FileRegistry::new(&out, temp.path().join("converted"));
    registry.refresh().await.unwrap();
    registry.select(&[out.join("a.mp3"), out.join("c.mp3")]);

    std::fs::remove_file(out.join("a.mp3")).unwrap();
    let rows = registry.refresh().await.unwrap();

    assert_eq!(registry.selected(), vec![out.join("c.mp3")]);
    let selected: Vec<bool> = rows.iter().map(ListRow::is_selected).collect();
    assert_eq!(selected, vec![false, true]);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    /// Refreshing without filesystem changes keeps the same rows and selection
    #[test]
    fn refresh_preserves_selection(
        out_names in proptest::collection::btree_set("[a-z]{1,8}\\.mp3", 0..10),
        conv_names in proptest::collection::btree_set("[a-z]{1,8}\\.wav", 0..10),
        picks in proptest::collection::vec(any::<bool>(), 20),
    ) {
        let temp = TempDir::new().unwrap();
        let out = temp.path().join("downloads");
        let conv = temp.path().join("converted");
        std::fs::create_dir_all(&out).unwrap();
        std::fs::create_dir_all(&conv).unwrap();
        for name in &out_names {
            std::fs::write(out.join(name), b"x").unwrap();
        }
        for name in &conv_names {
            std::fs::write(conv.join(name), b"x").unwrap();
        }

        let registry = FileRegistry::new(&out, &conv);
        let before = block_on(registry.refresh()).unwrap();
        prop_assert_eq!(registry.len(), out_names.len() + conv_names.len());

        let chosen: Vec<PathBuf> = registry
            .files()
            .iter()
            .zip(picks.iter())
            .filter(|(_, pick)| **pick)
            .map(|(f, _)| f.path.clone())
            .collect();
        registry.select(&chosen);
        let selected_before = registry.selected();

        let after = block_on(registry.refresh()).unwrap();

        prop_assert_eq!(registry.selected(), selected_before);
        let names_before: Vec<String> = before.iter().map(|r| r.to_string()).collect();
        let names_after: Vec<String> = after.iter().map(|r| r.to_string()).collect();
        prop_assert_eq!(names_before, names_after);

        // Output entries first, each group sorted
        let expected: Vec<String> = if out_names.is_empty() && conv_names.is_empty() {
            vec![NO_FILES_PLACEHOLDER.to_string()]
        } else {
            out_names.iter().chain(conv_names.iter()).cloned().collect::<Vec<_>>()
        };
        prop_assert_eq!(after.iter().map(|r| r.to_string()).collect::<Vec<_>>(), expected);

        let unique: BTreeSet<PathBuf> = registry.files().into_iter().map(|f| f.path).collect();
        prop_assert_eq!(unique.len(), registry.len());
    }
}
