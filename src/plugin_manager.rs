//! Registry that loads plugins and brokers component creation across them.

use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet};
use std::env::consts::DLL_SUFFIX;
use std::fs;
use std::path::{Path, PathBuf};
use std::ptr::NonNull;
use std::rc::Rc;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use libloading::Library;
use log::{debug, error, info, warn};

use crate::component::{Component, ComponentRef, Parameters};
use crate::error::{PluginError, PluginResult};
use crate::node::NodeRef;
use crate::plugin::{
    AbiVersionFn, CreatePluginFn, DestroyPluginFn, Plugin, PluginInfo, PluginState,
    ABI_VERSION_SYMBOL, CREATE_SYMBOL, DESTROY_SYMBOL, PLUGIN_ABI_VERSION,
};

/// Snapshot of a registered plugin
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PluginSummary {
    pub info: PluginInfo,
    pub state: PluginState,
    pub supported_components: Vec<String>,
    /// Library the plugin was loaded from, `None` for in-process registrations
    pub path: Option<PathBuf>,
}

struct RegisteredPlugin {
    plugin: Box<dyn Plugin>,
    path: Option<PathBuf>,
}

#[derive(Default)]
struct Registry {
    plugins: BTreeMap<String, RegisteredPlugin>,
}

/// Plugin registry.
///
/// Every operation takes a single lock, so loading, unloading and queries are
/// mutually exclusive when the manager is shared between threads. Dropping the
/// manager unloads every plugin still registered.
pub struct PluginManager {
    registry: Mutex<Registry>,
}

impl PluginManager {
    pub fn new() -> Self {
        PluginManager {
            registry: Mutex::new(Registry::default()),
        }
    }

    fn registry(&self) -> MutexGuard<'_, Registry> {
        self.registry.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Open the native library at `path`, instantiate its plugin and register it.
    ///
    /// On failure nothing is registered and the library is released.
    /// Returns the name the plugin reports for itself.
    pub fn load_plugin<P: AsRef<Path>>(&self, path: P) -> PluginResult<String> {
        let path = path.as_ref();
        info!("Loading plugin: {}", path.display());

        let result = NativePlugin::open(path).and_then(|plugin| {
            self.register(Box::new(plugin), Some(path.to_path_buf()))
        });
        if let Err(e) = &result {
            error!("{}", e);
        }
        result
    }

    /// Initialize and register a plugin that lives in this process
    pub fn register_plugin(&self, plugin: Box<dyn Plugin>) -> PluginResult<String> {
        self.register(plugin, None)
    }

    /// Initialize `plugin` and index it under its own name.
    ///
    /// A plugin already registered under that name is replaced; unlike a plain
    /// overwrite, the displaced instance is cleaned up before it is dropped.
    fn register(&self, mut plugin: Box<dyn Plugin>, path: Option<PathBuf>) -> PluginResult<String> {
        if !plugin.initialize() {
            return Err(PluginError::InitializationFailed {
                name: plugin.name().to_string(),
            });
        }

        let name = plugin.name().to_string();
        info!(
            "Successfully loaded plugin: {} v{}",
            name,
            plugin.version()
        );

        let displaced = self
            .registry()
            .plugins
            .insert(name.clone(), RegisteredPlugin { plugin, path });
        if let Some(mut old) = displaced {
            warn!(
                "Plugin '{}' replaced an already registered plugin of the same name",
                name
            );
            old.plugin.cleanup();
        }
        Ok(name)
    }

    /// Clean up and drop the plugin registered under `name`.
    /// Returns false when no such plugin is registered.
    pub fn unload_plugin(&self, name: &str) -> bool {
        let removed = self.registry().plugins.remove(name);
        match removed {
            Some(mut entry) => {
                entry.plugin.cleanup();
                drop(entry);
                info!("Unloaded plugin: {}", name);
                true
            }
            None => false,
        }
    }

    pub fn unload_all_plugins(&self) {
        for name in self.loaded_plugins() {
            self.unload_plugin(&name);
        }
    }

    /// Names of registered plugins, in registry order
    pub fn loaded_plugins(&self) -> Vec<String> {
        self.registry().plugins.keys().cloned().collect()
    }

    pub fn get_plugin(&self, name: &str) -> Option<PluginSummary> {
        self.registry().plugins.get(name).map(|entry| PluginSummary {
            info: entry.plugin.info().clone(),
            state: entry.plugin.state(),
            supported_components: entry.plugin.supported_components(),
            path: entry.path.clone(),
        })
    }

    /// Build a component from the first plugin, in registry order, that
    /// supports `type_tag` and produces an instance.
    pub fn create_component(&self, type_tag: &str, parameters: &Parameters) -> Option<ComponentRef> {
        let registry = self.registry();
        for (name, entry) in &registry.plugins {
            if !entry.plugin.supports(type_tag) {
                continue;
            }
            if let Some(component) = entry.plugin.create_component(type_tag, parameters) {
                debug!("Created component '{}' using plugin '{}'", type_tag, name);
                let component: ComponentRef = Rc::new(RefCell::new(component));
                return Some(component);
            }
        }

        warn!("No plugin found to create component type: {}", type_tag);
        None
    }

    /// Every type tag any registered plugin supports, sorted and deduplicated
    pub fn all_supported_components(&self) -> Vec<String> {
        let all: BTreeSet<String> = self
            .registry()
            .plugins
            .values()
            .flat_map(|entry| entry.plugin.supported_components())
            .collect();
        all.into_iter().collect()
    }

    /// List regular files in `directory` carrying the platform library suffix.
    ///
    /// A missing directory or an I/O failure yields an empty list.
    pub fn discover_plugins<P: AsRef<Path>>(&self, directory: P) -> Vec<PathBuf> {
        let directory = directory.as_ref();
        if !directory.is_dir() {
            debug!("Plugin directory {} does not exist", directory.display());
            return Vec::new();
        }

        match scan_directory(directory) {
            Ok(mut found) => {
                found.sort();
                found
            }
            Err(e) => {
                warn!("Error discovering plugins in {}: {}", directory.display(), e);
                Vec::new()
            }
        }
    }

    /// Discover and load every plugin in `directory`, returning the names that loaded
    pub fn load_directory<P: AsRef<Path>>(&self, directory: P) -> Vec<String> {
        self.discover_plugins(directory)
            .iter()
            .filter_map(|path| self.load_plugin(path).ok())
            .collect()
    }
}

impl Default for PluginManager {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for PluginManager {
    fn drop(&mut self) {
        self.unload_all_plugins();
    }
}

fn scan_directory(directory: &Path) -> std::io::Result<Vec<PathBuf>> {
    let mut found = Vec::new();
    for entry in fs::read_dir(directory)? {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        if entry.file_name().to_string_lossy().ends_with(DLL_SUFFIX) {
            found.push(entry.path());
        }
    }
    Ok(found)
}

/// A plugin instance living inside a dynamically loaded library
struct NativePlugin {
    instance: NonNull<Box<dyn Plugin>>,
    destroy: Option<DestroyPluginFn>,
    library: Arc<Library>,
}

// SAFETY: the instance is a `Box<dyn Plugin>` and `Plugin: Send`; the raw
// pointer only hides that type across the library boundary.
unsafe impl Send for NativePlugin {}

impl NativePlugin {
    fn open(path: &Path) -> PluginResult<Self> {
        // SAFETY: loading runs the library's initialisers; plugin libraries are trusted.
        let library = unsafe { Library::new(path) }.map_err(|source| PluginError::LibraryOpen {
            path: path.to_path_buf(),
            source,
        })?;

        // SAFETY: symbol types match the ones `declare_plugin!` exports.
        unsafe {
            if let Ok(abi_version) = library.get::<AbiVersionFn>(ABI_VERSION_SYMBOL) {
                let found = abi_version();
                if found != PLUGIN_ABI_VERSION {
                    return Err(PluginError::AbiMismatch {
                        path: path.to_path_buf(),
                        found,
                        expected: PLUGIN_ABI_VERSION,
                    });
                }
            }

            let create: CreatePluginFn = *library
                .get::<CreatePluginFn>(CREATE_SYMBOL)
                .map_err(|source| PluginError::MissingSymbol {
                    path: path.to_path_buf(),
                    symbol: symbol_name(CREATE_SYMBOL),
                    source,
                })?;
            let destroy: Option<DestroyPluginFn> =
                library.get::<DestroyPluginFn>(DESTROY_SYMBOL).ok().map(|f| *f);

            let instance = NonNull::new(create() as *mut Box<dyn Plugin>).ok_or_else(|| {
                PluginError::NullInstance {
                    path: path.to_path_buf(),
                }
            })?;

            Ok(NativePlugin {
                instance,
                destroy,
                library: Arc::new(library),
            })
        }
    }

    fn plugin(&self) -> &dyn Plugin {
        // SAFETY: `instance` stays valid until `drop`.
        unsafe { self.instance.as_ref().as_ref() }
    }

    fn plugin_mut(&mut self) -> &mut dyn Plugin {
        // SAFETY: as above, and `&mut self` guarantees exclusive access.
        unsafe { self.instance.as_mut().as_mut() }
    }
}

impl Plugin for NativePlugin {
    fn info(&self) -> &PluginInfo {
        self.plugin().info()
    }

    fn state(&self) -> PluginState {
        self.plugin().state()
    }

    fn initialize(&mut self) -> bool {
        self.plugin_mut().initialize()
    }

    fn cleanup(&mut self) {
        self.plugin_mut().cleanup()
    }

    fn create_component(&self, type_tag: &str, parameters: &Parameters) -> Option<Box<dyn Component>> {
        let inner = self.plugin().create_component(type_tag, parameters)?;
        let component: Box<dyn Component> = Box::new(LibraryBound {
            inner,
            _library: Arc::clone(&self.library),
        });
        Some(component)
    }

    fn supported_components(&self) -> Vec<String> {
        self.plugin().supported_components()
    }
}

/// Hands the instance back to the library's `icsim_destroy_plugin` export so the
/// allocating side also frees it. Libraries without that export get the box
/// reclaimed here.
impl Drop for NativePlugin {
    fn drop(&mut self) {
        let raw = self.instance.as_ptr();
        // SAFETY: `raw` came from the library's create function and is dropped
        // exactly once, while `library` is still mapped.
        unsafe {
            match self.destroy {
                Some(destroy) => destroy(raw.cast()),
                None => drop(Box::from_raw(raw)),
            }
        }
    }
}

/// Component whose code lives in a plugin library; keeps the library mapped
/// for as long as the component exists.
struct LibraryBound {
    inner: Box<dyn Component>,
    _library: Arc<Library>,
}

impl Component for LibraryBound {
    fn id(&self) -> &str {
        self.inner.id()
    }

    fn set_id(&mut self, id: String) {
        self.inner.set_id(id)
    }

    fn advance(&mut self, timestep: f64) {
        self.inner.advance(timestep)
    }

    fn current_value(&self) -> f64 {
        self.inner.current_value()
    }

    fn attach(&mut self, node: NodeRef) {
        self.inner.attach(node)
    }

    fn terminals(&self) -> &[NodeRef] {
        self.inner.terminals()
    }

    fn type_tag(&self) -> &str {
        self.inner.type_tag()
    }
}

fn symbol_name(symbol: &[u8]) -> String {
    String::from_utf8_lossy(symbol.strip_suffix(b"\0").unwrap_or(symbol)).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::component::Terminals;
    use crate::plugin::{BasePlugin, ComponentFactory};

    struct Widget {
        id: String,
        terminals: Terminals,
        gain: f64,
    }

    impl Component for Widget {
        fn id(&self) -> &str {
            &self.id
        }
        fn set_id(&mut self, id: String) {
            self.id = id;
        }
        fn advance(&mut self, _timestep: f64) {}
        fn current_value(&self) -> f64 {
            self.gain
        }
        fn attach(&mut self, node: NodeRef) {
            self.terminals.push(node);
        }
        fn terminals(&self) -> &[NodeRef] {
            self.terminals.as_slice()
        }
        fn type_tag(&self) -> &str {
            "Widget"
        }
    }

    struct WidgetFactory {
        types: Vec<&'static str>,
        gain: f64,
        init_ok: bool,
    }

    impl ComponentFactory for WidgetFactory {
        fn supported_components(&self) -> Vec<String> {
            self.types.iter().map(|t| t.to_string()).collect()
        }

        fn create_component(&self, type_tag: &str, parameters: &Parameters) -> Option<Box<dyn Component>> {
            (type_tag == "Widget").then(|| {
                Box::new(Widget {
                    id: String::new(),
                    terminals: Terminals::new(),
                    gain: crate::component::parameter(parameters, "gain", self.gain),
                }) as Box<dyn Component>
            })
        }

        fn on_initialize(&mut self) -> bool {
            self.init_ok
        }
    }

    fn widget_plugin(name: &str, types: Vec<&'static str>, gain: f64) -> Box<dyn Plugin> {
        Box::new(BasePlugin::new(
            PluginInfo::new(name, "1.0.0", "widgets"),
            WidgetFactory {
                types,
                gain,
                init_ok: true,
            },
        ))
    }

    #[test]
    fn test_plugin_round_trip() {
        let manager = PluginManager::new();
        let name = manager
            .register_plugin(widget_plugin("WidgetPlugin", vec!["Widget"], 1.0))
            .unwrap();
        assert_eq!(name, "WidgetPlugin");

        let widget = manager.create_component("Widget", &Parameters::new()).unwrap();
        assert_eq!(widget.borrow().type_tag(), "Widget");
        assert!(manager.create_component("Nonexistent", &Parameters::new()).is_none());
    }

    #[test]
    fn test_parameters_reach_factory() {
        let manager = PluginManager::new();
        manager
            .register_plugin(widget_plugin("WidgetPlugin", vec!["Widget"], 1.0))
            .unwrap();

        let mut parameters = Parameters::new();
        parameters.insert("gain".to_string(), 3.5);
        let widget = manager.create_component("Widget", &parameters).unwrap();
        assert_eq!(widget.borrow().current_value(), 3.5);
    }

    #[test]
    fn test_unload_plugin() {
        let manager = PluginManager::new();
        assert!(!manager.unload_plugin("WidgetPlugin"));
        assert!(manager.loaded_plugins().is_empty());

        manager
            .register_plugin(widget_plugin("WidgetPlugin", vec!["Widget"], 1.0))
            .unwrap();
        assert!(!manager.unload_plugin("Other"));
        assert_eq!(manager.loaded_plugins(), vec!["WidgetPlugin"]);

        assert!(manager.unload_plugin("WidgetPlugin"));
        assert!(manager.loaded_plugins().is_empty());
        assert!(manager.create_component("Widget", &Parameters::new()).is_none());
    }

    #[test]
    fn test_unload_all_plugins() {
        let manager = PluginManager::new();
        manager.register_plugin(widget_plugin("A", vec!["Widget"], 1.0)).unwrap();
        manager.register_plugin(widget_plugin("B", vec!["Gizmo"], 1.0)).unwrap();
        assert_eq!(manager.loaded_plugins().len(), 2);

        manager.unload_all_plugins();
        assert!(manager.loaded_plugins().is_empty());
    }

    #[test]
    fn test_failed_initialize_is_not_registered() {
        let manager = PluginManager::new();
        let plugin = Box::new(BasePlugin::new(
            PluginInfo::new("Broken", "0.0.1", "never initializes"),
            WidgetFactory {
                types: vec!["Widget"],
                gain: 1.0,
                init_ok: false,
            },
        ));

        let err = manager.register_plugin(plugin).unwrap_err();
        assert!(matches!(err, PluginError::InitializationFailed { ref name } if name == "Broken"));
        assert!(manager.loaded_plugins().is_empty());
    }

    #[test]
    fn test_supported_components_union() {
        let manager = PluginManager::new();
        manager
            .register_plugin(widget_plugin("A", vec!["Widget", "Gizmo"], 1.0))
            .unwrap();
        manager
            .register_plugin(widget_plugin("B", vec!["Widget", "Anvil"], 1.0))
            .unwrap();

        assert_eq!(
            manager.all_supported_components(),
            vec!["Anvil", "Gizmo", "Widget"]
        );
    }

    #[test]
    fn test_create_component_follows_registry_order() {
        let manager = PluginManager::new();
        manager.register_plugin(widget_plugin("Zeta", vec!["Widget"], 2.0)).unwrap();
        manager.register_plugin(widget_plugin("Alpha", vec!["Widget"], 1.0)).unwrap();

        let widget = manager.create_component("Widget", &Parameters::new()).unwrap();
        assert_eq!(widget.borrow().current_value(), 1.0);
    }

    #[test]
    fn test_create_component_skips_failing_plugin() {
        let manager = PluginManager::new();
        // Claims Gizmo but its factory only builds Widgets
        manager.register_plugin(widget_plugin("Alpha", vec!["Gizmo"], 1.0)).unwrap();
        assert!(manager.create_component("Gizmo", &Parameters::new()).is_none());
    }

    #[test]
    fn test_name_collision_last_wins() {
        let manager = PluginManager::new();
        manager.register_plugin(widget_plugin("Same", vec!["Widget"], 1.0)).unwrap();
        manager.register_plugin(widget_plugin("Same", vec!["Gizmo"], 1.0)).unwrap();

        assert_eq!(manager.loaded_plugins(), vec!["Same"]);
        let summary = manager.get_plugin("Same").unwrap();
        assert_eq!(summary.supported_components, vec!["Gizmo"]);
        assert_eq!(summary.state, PluginState::Initialized);
        assert_eq!(summary.path, None);
    }

    #[test]
    fn test_get_plugin_absent() {
        let manager = PluginManager::new();
        assert!(manager.get_plugin("missing").is_none());
    }

    #[test]
    fn test_load_missing_library_fails() {
        let manager = PluginManager::new();
        let err = manager.load_plugin("nonexistent.so").unwrap_err();
        assert!(matches!(err, PluginError::LibraryOpen { .. }));
        assert!(manager.loaded_plugins().is_empty());
    }

    #[test]
    fn test_load_non_library_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(format!("garbage{}", DLL_SUFFIX));
        fs::write(&path, b"not a shared library").unwrap();

        let manager = PluginManager::new();
        assert!(manager.load_plugin(&path).is_err());
        assert!(manager.loaded_plugins().is_empty());
        assert!(manager.load_directory(dir.path()).is_empty());
    }

    #[test]
    fn test_discover_missing_directory() {
        let manager = PluginManager::new();
        assert!(manager.discover_plugins("does/not/exist").is_empty());
    }

    #[test]
    fn test_discover_filters_by_suffix() {
        let dir = tempfile::tempdir().unwrap();
        let lib_b = dir.path().join(format!("b_plugin{}", DLL_SUFFIX));
        let lib_a = dir.path().join(format!("a_plugin{}", DLL_SUFFIX));
        fs::write(&lib_b, b"").unwrap();
        fs::write(&lib_a, b"").unwrap();
        fs::write(dir.path().join("readme.txt"), b"").unwrap();
        fs::create_dir(dir.path().join(format!("nested{}", DLL_SUFFIX))).unwrap();

        let manager = PluginManager::new();
        assert_eq!(manager.discover_plugins(dir.path()), vec![lib_a, lib_b]);
    }

    #[test]
    fn test_symbol_name() {
        assert_eq!(symbol_name(CREATE_SYMBOL), "icsim_create_plugin");
    }
}
