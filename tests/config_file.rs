//! Configuration loading and its effect on an open archive

use rezmgr::{RezConfig, RezError, RezMgr, TypeTag};
use tempfile::TempDir;

#[test]
fn test_config_from_file_drives_paths() {
    let temp = TempDir::new().unwrap();
    let config_path = temp.path().join("rez.toml");
    std::fs::write(
        &config_path,
        r#"
dir_separators = "/"
dir_bins = 3
item_by_id = true
user_title = "Custom"
"#,
    )
    .unwrap();

    let config = RezConfig::load(&config_path).unwrap();
    assert_eq!(config.dir_bins, 3);
    assert_eq!(config.by_name_bins, 19);

    let mut mgr = RezMgr::with_config(config).unwrap();
    mgr.open(temp.path().join("custom.rez"), false, true).unwrap();
    assert_eq!(mgr.user_title(), "Custom");

    let root = mgr.root_dir().unwrap();
    let maps = mgr.create_dir(root, "MAPS").unwrap();
    // Backslash is an ordinary name character with a custom separator set
    let odd = mgr.create_dir(maps, "A\\B").unwrap();
    let item = mgr.create_rez_with_id(odd, 7, "LEVEL", TypeTag::from("MAP")).unwrap();

    assert_eq!(mgr.get_dir_from_path("/MAPS/A\\B/"), Some(odd));
    assert_eq!(mgr.get_rez_from_path("MAPS/A\\B/LEVEL", TypeTag::from("MAP")), Some(item));
    assert_eq!(mgr.get_rez_by_id(odd, 7, TypeTag::from("MAP")), Some(item));
    assert_eq!(mgr.dir_path(root).unwrap(), "/");
    assert_eq!(mgr.item_path(item).unwrap(), "/MAPS/A\\B/LEVEL");

    assert!(matches!(
        mgr.create_dir(root, "BAD/NAME"),
        Err(RezError::InvalidName(_))
    ));
}

#[test]
fn test_bad_config_rejected() {
    assert!(matches!(
        RezConfig::from_toml_str("max_open_files = 0"),
        Err(RezError::Config(_))
    ));
    assert!(matches!(
        RezConfig::from_toml_str("dir_bins = \"five\""),
        Err(RezError::ConfigParse(_))
    ));

    let config = RezConfig {
        type_bins: 0,
        ..RezConfig::default()
    };
    assert!(matches!(RezMgr::with_config(config), Err(RezError::Config(_))));
}

#[test]
fn test_missing_config_file() {
    let temp = TempDir::new().unwrap();
    assert!(matches!(
        RezConfig::load(temp.path().join("absent.toml")),
        Err(RezError::Io(_))
    ));
}
