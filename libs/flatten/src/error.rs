//! Netlist compilation errors.

use arcstr::ArcStr;
use itertools::Itertools;
use schir::{CellRef, InstancePath};

/// The result type returned by compilation.
pub type Result<T> = std::result::Result<T, Error>;

/// Possible compilation errors.
#[derive(thiserror::Error, Debug, Clone)]
#[allow(missing_docs)]
pub enum Error {
    #[error("cannot resolve cell `{cell}` of instance `{instance}` in `{path}`: {source}")]
    Resolve {
        path: InstancePath,
        instance: ArcStr,
        cell: CellRef,
        #[source]
        source: celllib::Error,
    },
    #[error("unconnected port: instance `{instance}` in `{path}` does not specify a connection for port `{port}` of cell `{cell}`")]
    UnconnectedPort {
        path: InstancePath,
        instance: ArcStr,
        port: ArcStr,
        cell: ArcStr,
    },
    #[error("unknown port: instance `{instance}` in `{path}` connects port `{port}`, which cell `{cell}` does not have")]
    UnknownPort {
        path: InstancePath,
        instance: ArcStr,
        port: ArcStr,
        cell: ArcStr,
    },
    #[error("unknown net `{net}` in `{path}`, referenced by {referenced_by}")]
    UnknownNet {
        path: InstancePath,
        net: ArcStr,
        referenced_by: ArcStr,
    },
    #[error("port `{port}` of cell `{cell}` has no internal net with the same name")]
    MissingPortNet { cell: ArcStr, port: ArcStr },
    #[error("invalid name `{name}` in `{path}`: instance and net names may not contain `.`")]
    InvalidName { path: InstancePath, name: ArcStr },
    #[error("cell `{cell}` is a primitive device and cannot be used as the top cell")]
    NotSubcircuit { cell: ArcStr },
    #[error("recursive hierarchy: instance `{path}` re-enters cell `{cell}` ({})", .cycle.iter().join(" -> "))]
    RecursiveHierarchy {
        path: InstancePath,
        cell: ArcStr,
        cycle: Vec<ArcStr>,
    },
    #[error("unresolved parameter: `{param}` of instance `{instance}` in `{path}` references undefined name `{name}`")]
    UnresolvedParameter {
        path: InstancePath,
        instance: ArcStr,
        param: ArcStr,
        name: ArcStr,
    },
    #[error("instance `{instance}` in `{path}` sets parameter `{param}`, which cell `{cell}` does not declare")]
    UndeclaredParameter {
        path: InstancePath,
        instance: ArcStr,
        param: ArcStr,
        cell: ArcStr,
    },
    #[error("invalid value for parameter `{param}` of instance `{instance}` in `{path}`: {reason}")]
    InvalidExpression {
        path: InstancePath,
        instance: ArcStr,
        param: ArcStr,
        reason: String,
    },
}
