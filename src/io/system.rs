use std::collections::BTreeSet;
use std::sync::mpsc;

use serde_json::{Map, Value};

use crate::file_info::FileInfo;
use crate::foundation::error::{DjvError, DjvResult};
use crate::foundation::log::Logger;
use crate::io::plugin::{ImageRead, ImageWrite, IoPlugin};
use crate::io::{IoInfo, OptionChanged};

/// Registry of I/O plugins, dispatching by file extension in registration order.
pub struct IoSystem {
    plugins: Vec<Box<dyn IoPlugin>>,
    subscribers: Vec<mpsc::Sender<OptionChanged>>,
    logger: Logger,
}

impl std::fmt::Debug for IoSystem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IoSystem")
            .field("plugins", &self.names())
            .field("logger", &self.logger)
            .finish()
    }
}

impl IoSystem {
    /// System with every built-in plugin registered.
    pub fn new(logger: Logger) -> Self {
        Self::with_plugins(logger, crate::formats::default_plugins())
    }

    /// System with an explicit plugin list.
    pub fn with_plugins(logger: Logger, plugins: Vec<Box<dyn IoPlugin>>) -> Self {
        let mut out = Self {
            plugins: Vec::with_capacity(plugins.len()),
            subscribers: Vec::new(),
            logger,
        };
        for p in plugins {
            out.register(p);
        }
        out
    }

    /// Append a plugin; it is consulted after every plugin registered before it.
    pub fn register(&mut self, plugin: Box<dyn IoPlugin>) {
        self.logger.scope(|| {
            tracing::info!(
                plugin = plugin.name(),
                description = plugin.description(),
                extensions = %plugin.extensions().join(", "),
                "registered I/O plugin"
            )
        });
        self.plugins.push(plugin);
    }

    pub fn logger(&self) -> &Logger {
        &self.logger
    }

    /// Plugin names in registration order.
    pub fn names(&self) -> Vec<&'static str> {
        self.plugins.iter().map(|p| p.name()).collect()
    }

    pub fn plugins(&self) -> impl Iterator<Item = &dyn IoPlugin> {
        self.plugins.iter().map(|p| p.as_ref())
    }

    pub fn plugin(&self, name: &str) -> Option<&dyn IoPlugin> {
        self.plugins().find(|p| p.name() == name)
    }

    fn plugin_mut(&mut self, name: &str) -> DjvResult<&mut Box<dyn IoPlugin>> {
        self.plugins
            .iter_mut()
            .find(|p| p.name() == name)
            .ok_or_else(|| DjvError::validation(format!("no I/O plugin named '{name}'")))
    }

    pub fn can_read(&self, info: &FileInfo) -> bool {
        self.plugins.iter().any(|p| p.can_read(info))
    }

    pub fn can_write(&self, info: &FileInfo, io: &IoInfo) -> bool {
        self.plugins.iter().any(|p| p.can_write(info, io))
    }

    /// Open `info` with the first plugin that claims it.
    ///
    /// Errors from the chosen plugin propagate as-is; later plugins are not tried.
    pub fn read(&self, info: &FileInfo) -> DjvResult<Box<dyn ImageRead>> {
        let plugin = self
            .plugins
            .iter()
            .find(|p| p.can_read(info))
            .ok_or_else(|| DjvError::unrecognized(info.to_string()))?;
        self.logger.scope(|| {
            tracing::debug!(plugin = plugin.name(), file = %info, "open for read");
            plugin.read(info)
        })
    }

    /// Create a writer for `info` with the first plugin that can store `io`.
    pub fn write(&self, info: &FileInfo, io: &IoInfo) -> DjvResult<Box<dyn ImageWrite>> {
        let plugin = self
            .plugins
            .iter()
            .find(|p| p.can_write(info, io))
            .ok_or_else(|| DjvError::unrecognized(info.to_string()))?;
        self.logger.scope(|| {
            tracing::debug!(plugin = plugin.name(), file = %info, "open for write");
            plugin.write(info, io)
        })
    }

    /// Extensions of plugins whose numbered files form sequences.
    pub fn sequence_extensions(&self) -> BTreeSet<String> {
        self.extensions_where(true)
    }

    /// Extensions of single-file (container) plugins.
    pub fn non_sequence_extensions(&self) -> BTreeSet<String> {
        self.extensions_where(false)
    }

    fn extensions_where(&self, sequence: bool) -> BTreeSet<String> {
        self.plugins
            .iter()
            .filter(|p| p.can_sequence() == sequence)
            .flat_map(|p| p.extensions().iter().map(|e| e.to_string()))
            .collect()
    }

    pub fn option(&self, plugin: &str, name: &str) -> Option<Value> {
        self.plugin(plugin)?.option(name)
    }

    /// Set one plugin option and notify subscribers.
    pub fn set_option(&mut self, plugin: &str, name: &str, value: Value) -> DjvResult<()> {
        let p = self.plugin_mut(plugin)?;
        p.set_option(name, value)?;
        let plugin = p.name();
        self.notify(plugin, [name.to_string()]);
        Ok(())
    }

    /// Every plugin's options as `{ "<plugin>": { ... } }`.
    pub fn settings(&self) -> Value {
        let mut map = Map::new();
        for p in &self.plugins {
            map.insert(p.name().to_string(), p.options_json());
        }
        Value::Object(map)
    }

    /// Apply the output of [`IoSystem::settings`]; unknown plugins and keys are ignored.
    pub fn load_settings(&mut self, value: &Value) -> DjvResult<()> {
        let Some(groups) = value.as_object() else {
            return Err(DjvError::validation("I/O settings must be a JSON object"));
        };
        for i in 0..self.plugins.len() {
            let name = self.plugins[i].name();
            let Some(group) = groups.get(name) else {
                continue;
            };
            let applied = self.plugins[i].load_options_json(group)?;
            self.notify(name, applied);
        }
        Ok(())
    }

    /// Receive an [`OptionChanged`] for every option change from now on.
    pub fn subscribe(&mut self) -> mpsc::Receiver<OptionChanged> {
        let (tx, rx) = mpsc::channel();
        self.subscribers.push(tx);
        rx
    }

    /// Let every plugin consume its flags; returns the tokens nobody claimed, in order.
    pub fn command_line(&mut self, mut args: Vec<String>) -> DjvResult<Vec<String>> {
        for i in 0..self.plugins.len() {
            let changed = self.plugins[i].command_line(&mut args)?;
            let name = self.plugins[i].name();
            self.notify(name, changed);
        }
        Ok(args)
    }

    fn notify(&mut self, plugin: &'static str, options: impl IntoIterator<Item = String>) {
        for option in options {
            self.logger.scope(|| {
                tracing::debug!(plugin, option = %option, "option changed");
            });
            let msg = OptionChanged {
                plugin: plugin.to_string(),
                option,
            };
            self.subscribers.retain(|tx| tx.send(msg.clone()).is_ok());
        }
    }
}
