use std::fs;

use gitlite::config::{IndexConfig, WorkspaceConfig};
use gitlite::error::GitLiteResult;
use gitlite::index::{IndexKind, OrderedIndex};
use gitlite::session::Workspace;
use gitlite::storage::FileSink;
use tempfile::TempDir;

const STUDENTS: &str = "\
Name,Age,City
Zara,21,Lahore
Ali,22,Karachi
Sana,20,Lahore
Omar
Bilal,23,Quetta
";

fn write_dataset(dir: &TempDir) -> GitLiteResult<std::path::PathBuf> {
    let path = dir.path().join("students.csv");
    fs::write(&path, STUDENTS)?;
    Ok(path)
}

#[test]
fn init_writes_one_record_per_key() -> GitLiteResult<()> {
    let temp_dir = TempDir::new()?;
    let csv = write_dataset(&temp_dir)?;
    let mut workspace = Workspace::open(WorkspaceConfig::new(temp_dir.path()))?;

    let avl = IndexConfig::default().with_kind(IndexKind::Avl);
    let repo = workspace.init_repository("students", &csv, avl, "City")?;
    assert_eq!(repo.index()?.keys(), vec!["Karachi", "Lahore", "Quetta"]);

    let dir = temp_dir.path().join("students-repo");
    let text = fs::read_to_string(dir.join("Lahore.txt"))?;
    assert!(text.starts_with("Key: Lahore\nHash: "));
    assert!(text.contains("Row Data: Zara 21 Lahore\n"));
    assert!(temp_dir.path().join("repositories_metadata.txt").exists());
    Ok(())
}

#[test]
fn branch_edits_stay_on_their_branch() -> GitLiteResult<()> {
    let temp_dir = TempDir::new()?;
    let csv = write_dataset(&temp_dir)?;
    let mut workspace = Workspace::open(WorkspaceConfig::new(temp_dir.path()))?;
    let rb = IndexConfig::default().with_kind(IndexKind::RedBlack);
    workspace.init_repository("students", &csv, rb, "Name")?;

    let repo = workspace.current_mut()?;
    let main_hash = repo.root_hash()?;
    repo.create_branch("feature")?;
    repo.checkout("feature")?;
    assert_eq!(repo.update("City", "Multan", "City", "Lahore")?, 2);
    assert_eq!(repo.delete_range("A", "C")?, 2);
    assert_eq!(repo.index()?.keys(), vec!["Omar", "Sana", "Zara"]);

    let feature = FileSink::new(repo.directory().join("feature"));
    let sana = feature.read("Sana")?.unwrap();
    assert_eq!(sana.rows, vec![vec!["Sana", "20", "Multan"]]);

    repo.checkout("main")?;
    assert_eq!(repo.root_hash()?, main_hash);
    assert_eq!(repo.select("Sana")?.unwrap()[2], "Lahore");
    assert_eq!(repo.index()?.len(), 5);
    Ok(())
}

#[test]
fn reopened_workspace_reloads_from_records() -> GitLiteResult<()> {
    let temp_dir = TempDir::new()?;
    let csv = write_dataset(&temp_dir)?;
    let config = WorkspaceConfig::new(temp_dir.path());
    let expected_hash;
    {
        let mut workspace = Workspace::open(config.clone())?;
        let avl = IndexConfig::default().with_kind(IndexKind::Avl);
        workspace.init_repository("students", &csv, avl, "Name")?;
        let repo = workspace.current_mut()?;
        repo.delete("Omar")?;
        repo.delete("Ali")?;
        expected_hash = repo.root_hash()?;
    }

    let mut workspace = Workspace::open(config)?;
    let repo = workspace.switch("students")?;
    assert_eq!(repo.index()?.keys(), vec!["Bilal", "Sana", "Zara"]);
    assert_eq!(repo.root_hash()?, expected_hash);
    assert_eq!(repo.columns(), vec!["Name", "Age", "City"]);

    workspace.delete_repository("students")?;
    assert!(!temp_dir.path().join("students-repo").exists());
    assert!(workspace.list().is_empty());
    Ok(())
}

#[test]
fn comma_keys_survive_reload() -> GitLiteResult<()> {
    let temp_dir = TempDir::new()?;
    let csv = temp_dir.path().join("people.csv");
    fs::write(&csv, "Name,Age\n\"Smith, John\",40\nann,31\n")?;
    let config = WorkspaceConfig::new(temp_dir.path());
    for kind in [IndexKind::Avl, IndexKind::RedBlack] {
        let name = format!("people-{kind}");
        let expected_hash;
        {
            let mut workspace = Workspace::open(config.clone())?;
            let index_config = IndexConfig::default().with_kind(kind);
            let repo = workspace.init_repository(&name, &csv, index_config, "Name")?;
            assert_eq!(repo.index()?.keys(), vec!["Smith, John", "ann"]);
            expected_hash = repo.root_hash()?;
        }

        let mut workspace = Workspace::open(config.clone())?;
        let repo = workspace.switch(&name)?;
        assert_eq!(repo.index()?.keys(), vec!["Smith, John", "ann"], "{kind}");
        assert_eq!(repo.root_hash()?, expected_hash);
    }
    Ok(())
}

#[test]
fn branch_named_like_a_record_file_reloads() -> GitLiteResult<()> {
    let temp_dir = TempDir::new()?;
    let csv = write_dataset(&temp_dir)?;
    let config = WorkspaceConfig::new(temp_dir.path());
    {
        let mut workspace = Workspace::open(config.clone())?;
        let avl = IndexConfig::default().with_kind(IndexKind::Avl);
        workspace.init_repository("students", &csv, avl, "Name")?;
        workspace.current_mut()?.create_branch("v1.txt")?;
    }

    let mut workspace = Workspace::open(config)?;
    let repo = workspace.switch("students")?;
    assert_eq!(repo.branches(), vec!["main", "v1.txt"]);
    assert_eq!(repo.index()?.len(), 5);
    Ok(())
}

#[test]
fn btree_repository_rejects_edits() -> GitLiteResult<()> {
    let mut workspace = Workspace::new_temp()?;
    let temp_dir = TempDir::new()?;
    let csv = write_dataset(&temp_dir)?;
    let btree = IndexConfig::default()
        .with_kind(IndexKind::BTree)
        .with_btree_min_degree(2usize);
    workspace.init_repository("students", &csv, btree, "Age")?;

    let repo = workspace.current_mut()?;
    assert!(repo.delete("21").is_err());
    assert!(repo.root_hash().is_err());
    assert!(repo.insert_row("19", vec!["Hina".into(), "19".into(), "Sukkur".into()])?);
    assert_eq!(repo.select_range("19", "21")?.len(), 3);
    assert!(repo.print_tree()?.starts_with("Node ID: "));
    Ok(())
}
