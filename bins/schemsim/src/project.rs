//! Project files.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use arcstr::ArcStr;
use celllib::{MemStore, Resolver};
use directives::{Dialect, Directive, DirectiveText, Ngspice, Xyce};
use flatten::{CompileOptions, Compiler, FlatNetlist, NetlistOptions};
use indexmap::IndexMap;
use itertools::Itertools;
use schir::{Cell, CellRef};
use serde::{Deserialize, Serialize};
use simstream::{ClientConfig, OverflowPolicy, ReorderPolicy, RetentionPolicy, Submission};

/// A set of cells stored under one namespace and version.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Library {
    pub namespace: ArcStr,
    pub version: ArcStr,
    #[serde(default)]
    pub cells: Vec<Cell>,
}

/// The simulator dialect to emit directives in.
#[derive(Debug, Copy, Clone, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DialectName {
    #[default]
    Ngspice,
    Xyce,
}

impl DialectName {
    fn dialect(&self) -> &'static dyn Dialect {
        match self {
            Self::Ngspice => &Ngspice,
            Self::Xyce => &Xyce,
        }
    }
}

/// Client settings. Durations are in milliseconds.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ClientSettings {
    pub addr: Option<String>,
    pub connect_timeout_ms: Option<u64>,
    pub accept_timeout_ms: Option<u64>,
    pub idle_timeout_ms: Option<u64>,
    pub cancel_grace_ms: Option<u64>,
    pub intake_capacity: Option<usize>,
    pub overflow: Option<OverflowPolicy>,
    pub reorder_depth: Option<usize>,
    pub max_samples: Option<usize>,
    /// Passed to the server with every submission.
    #[serde(default)]
    pub options: IndexMap<String, String>,
}

impl ClientSettings {
    pub fn config(&self, addr: Option<&str>) -> ClientConfig {
        let mut builder = ClientConfig::builder();
        if let Some(addr) = addr.or(self.addr.as_deref()) {
            builder.addr(addr);
        }
        if let Some(ms) = self.connect_timeout_ms {
            builder.connect_timeout(Duration::from_millis(ms));
        }
        if let Some(ms) = self.accept_timeout_ms {
            builder.accept_timeout(Duration::from_millis(ms));
        }
        if let Some(ms) = self.idle_timeout_ms {
            builder.idle_timeout(Duration::from_millis(ms));
        }
        if let Some(ms) = self.cancel_grace_ms {
            builder.cancel_grace(Duration::from_millis(ms));
        }
        if let Some(capacity) = self.intake_capacity {
            builder.intake_capacity(capacity);
        }
        if let Some(overflow) = self.overflow {
            builder.overflow(overflow);
        }
        if let Some(depth) = self.reorder_depth {
            builder.reorder(ReorderPolicy { depth });
        }
        if let Some(max_samples) = self.max_samples {
            builder.retention(RetentionPolicy {
                max_samples: Some(max_samples),
            });
        }
        builder.build()
    }
}

/// A project: a library, the cell to simulate, and what to run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Project {
    pub top: CellRef,
    #[serde(default)]
    pub dialect: DialectName,
    #[serde(default)]
    pub compile: CompileOptions,
    #[serde(default)]
    pub netlist: NetlistOptions,
    #[serde(default)]
    pub directives: Vec<Directive>,
    #[serde(default)]
    pub client: ClientSettings,
    #[serde(default)]
    pub libraries: Vec<Library>,
}

/// A compiled project, ready to be written out or submitted.
pub struct Compiled {
    pub netlist: FlatNetlist,
    pub directives: DirectiveText,
}

impl Project {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read project file {:?}.", path))?;
        Self::parse(&text).with_context(|| format!("Failed to parse project file {:?}.", path))
    }

    pub fn parse(text: &str) -> anyhow::Result<Self> {
        Ok(toml::from_str(text)?)
    }

    pub fn resolver(&self) -> Resolver {
        let store = MemStore::new();
        for library in &self.libraries {
            for cell in &library.cells {
                store.insert(library.namespace.clone(), library.version.as_str(), cell.clone());
            }
        }
        Resolver::new(Arc::new(store))
    }

    pub fn compile(&self) -> anyhow::Result<Compiled> {
        let resolver = self.resolver();
        let netlist = Compiler::flatten_ref(&self.top, &resolver, &self.compile)
            .with_context(|| format!("Failed to flatten {}.", self.top))?;
        for issue in netlist.lint.iter() {
            tracing::warn!("{}", issue);
        }

        let mut directives =
            directives::translate(&self.directives, &netlist.nets, self.dialect.dialect())
                .with_context(|| "Failed to translate directives.")?;
        if directives.probes.is_empty() && self.dialect == DialectName::Ngspice {
            let vectors = directives::default_vectors(&netlist.nets);
            if !vectors.is_empty() {
                tracing::debug!(vectors = vectors.len(), "saving default vectors");
                directives.text = format!(".save {}\n{}", vectors.iter().join(" "), directives.text);
            }
        }
        Ok(Compiled {
            netlist,
            directives,
        })
    }
}

impl Compiled {
    /// The complete simulator input.
    pub fn deck(&self, options: &NetlistOptions) -> String {
        flatten::SpiceText::new(&self.netlist, options).deck(&self.directives.text)
    }

    pub fn submission(self, options: &NetlistOptions, settings: &ClientSettings) -> Submission {
        let mut submission = Submission::new(&self.netlist, options, self.directives);
        submission.options = settings.options.clone();
        submission
    }
}
