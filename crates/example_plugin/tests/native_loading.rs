use std::env::consts::{DLL_PREFIX, DLL_SUFFIX};
use std::path::PathBuf;

use example_plugin::INDUCTOR;
use icsim::{connect, Node, Parameters, PluginManager, PluginState};

/// The `cdylib` artifact of this crate, built next to the test binary's `deps/`
fn plugin_library() -> PathBuf {
    let file_name = format!("{}example_plugin{}", DLL_PREFIX, DLL_SUFFIX);
    let deps = std::env::current_exe()
        .unwrap()
        .parent()
        .unwrap()
        .to_path_buf();

    [deps.parent().map(|dir| dir.join(&file_name)), Some(deps.join(&file_name))]
        .into_iter()
        .flatten()
        .find(|candidate| candidate.is_file())
        .unwrap_or_else(|| panic!("{} not found near {}", file_name, deps.display()))
}

#[test]
fn test_native_load_create_unload_reload() {
    let path = plugin_library();
    let manager = PluginManager::new();

    let name = manager.load_plugin(&path).unwrap();
    assert_eq!(name, "ExamplePlugin");
    assert_eq!(manager.all_supported_components(), vec!["Diode", "Inductor"]);

    let summary = manager.get_plugin("ExamplePlugin").unwrap();
    assert_eq!(summary.state, PluginState::Initialized);
    assert_eq!(summary.path.as_deref(), Some(path.as_path()));

    let vin = Node::shared("VIN");
    let gnd = Node::shared("GND");
    vin.borrow_mut().set_voltage(1.0);

    let mut parameters = Parameters::new();
    parameters.insert("inductance".to_string(), 1e-3);
    let inductor = manager.create_component(INDUCTOR, &parameters).unwrap();
    connect(&inductor, &vin);
    connect(&inductor, &gnd);
    assert_eq!(vin.borrow().attachment_count(), 1);

    inductor.borrow_mut().advance(1e-6);
    assert!((inductor.borrow().current_value() - 1e-3).abs() < 1e-12);

    // The component keeps the library mapped after its plugin is gone
    assert!(manager.unload_plugin("ExamplePlugin"));
    assert!(manager.loaded_plugins().is_empty());
    inductor.borrow_mut().advance(1e-6);
    assert!((inductor.borrow().current_value() - 2e-3).abs() < 1e-12);
    assert_eq!(inductor.borrow().type_tag(), INDUCTOR);

    // Loading the same library twice replaces the first instance
    assert_eq!(manager.load_plugin(&path).unwrap(), "ExamplePlugin");
    assert_eq!(manager.load_plugin(&path).unwrap(), "ExamplePlugin");
    assert_eq!(manager.loaded_plugins(), vec!["ExamplePlugin"]);
    assert!(manager.create_component(INDUCTOR, &Parameters::new()).is_some());

    drop(manager);
    inductor.borrow_mut().advance(1e-6);
    assert!((inductor.borrow().current_value() - 3e-3).abs() < 1e-12);
    drop(inductor);
}

#[test]
fn test_load_directory_picks_up_library() {
    let path = plugin_library();
    let dir = tempfile::tempdir().unwrap();
    let copy = dir.path().join(path.file_name().unwrap());
    std::fs::copy(&path, &copy).unwrap();
    std::fs::write(dir.path().join("notes.txt"), "not a plugin").unwrap();

    let manager = PluginManager::new();
    assert_eq!(manager.discover_plugins(dir.path()), vec![copy.clone()]);
    assert_eq!(manager.load_directory(dir.path()), vec!["ExamplePlugin"]);
    assert_eq!(manager.get_plugin("ExamplePlugin").unwrap().path, Some(copy));
}
