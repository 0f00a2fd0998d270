//! Depth-first flattening of a schematic hierarchy.

use std::sync::Arc;

use arcstr::ArcStr;
use celllib::{CellKey, LibraryVersion, Resolved, Resolver};
use indexmap::IndexMap;
use schir::{Cell, CellContents, EvalError, Expr, Instance, InstancePath, PrimitiveDevice, Scope, Value};
use tracing::{span, Level};

use crate::error::{Error, Result};
use crate::lint::LintReport;
use crate::netmap::{DeviceOrigin, NetAlias, NetNameMap};
use crate::shorts::{NetArena, NetKey};
use crate::{CompileOptions, FlatNetlist, FlatNetlistNode};

/// Flattens schematics, remembering the most recent result.
///
/// Recompiling with the same top cell, library version and options returns
/// the previous netlist without walking the hierarchy again.
#[derive(Default)]
pub struct Compiler {
    last: Option<Memo>,
}

struct Memo {
    top: Cell,
    version: LibraryVersion,
    options: CompileOptions,
    netlist: Arc<FlatNetlist>,
}

impl Compiler {
    /// Creates a compiler with nothing memoised.
    pub fn new() -> Self {
        Self::default()
    }

    /// Flattens `top`, reusing the previous result if nothing has changed.
    ///
    /// A change of `version` invalidates the resolver cache, so every cell
    /// is fetched again.
    pub fn compile(
        &mut self,
        top: &Cell,
        resolver: &Resolver,
        version: &LibraryVersion,
        options: &CompileOptions,
    ) -> Result<Arc<FlatNetlist>> {
        let invalidated = resolver.sync_library_version(version);
        if let Some(memo) = &self.last {
            if !invalidated
                && memo.version == *version
                && memo.options == *options
                && memo.top == *top
            {
                tracing::debug!(top = %top.name(), "reusing memoised netlist");
                return Ok(memo.netlist.clone());
            }
        }
        let netlist = Arc::new(Self::flatten(top, resolver, options)?);
        self.last = Some(Memo {
            top: top.clone(),
            version: version.clone(),
            options: options.clone(),
            netlist: netlist.clone(),
        });
        Ok(netlist)
    }

    /// Flattens `top` into primitive devices and global nets.
    ///
    /// Instances of `top` are resolved through `resolver`.
    pub fn flatten(top: &Cell, resolver: &Resolver, options: &CompileOptions) -> Result<FlatNetlist> {
        Flattener::new(resolver, options).run(Arc::new(top.clone()), None)
    }

    /// Resolves `top` from the library and flattens it.
    pub fn flatten_ref(
        top: &schir::CellRef,
        resolver: &Resolver,
        options: &CompileOptions,
    ) -> Result<FlatNetlist> {
        let resolved = resolver.resolve_ref(top).map_err(|source| Error::Resolve {
            path: InstancePath::top(),
            instance: top.name.clone(),
            cell: top.clone(),
            source,
        })?;
        Flattener::new(resolver, options).run(resolved.cell, Some(resolved.key))
    }
}

/// Looks names up in a level's own parameters, then in the symbolic
/// top-level parameters.
struct Layered<'a> {
    local: &'a IndexMap<ArcStr, Value>,
    globals: &'a IndexMap<ArcStr, Value>,
}

impl Scope for Layered<'_> {
    fn lookup(&self, name: &str) -> Option<Value> {
        self.local
            .get(name)
            .or_else(|| self.globals.get(name))
            .cloned()
    }
}

/// One level of the hierarchy being expanded.
struct Frame {
    cell: Arc<Cell>,
    identity: Option<CellKey>,
    path: InstancePath,
    scope: IndexMap<ArcStr, Value>,
    nets: IndexMap<ArcStr, NetKey>,
    children: Vec<(ArcStr, Resolved)>,
    next: usize,
}

struct PendingDevice {
    path: InstancePath,
    parent: ArcStr,
    cell: ArcStr,
    device: PrimitiveDevice,
    ports: Vec<NetKey>,
    params: IndexMap<ArcStr, Value>,
}

struct Flattener<'a> {
    resolver: &'a Resolver,
    options: &'a CompileOptions,
    arena: NetArena,
    devices: Vec<PendingDevice>,
    globals: IndexMap<ArcStr, Value>,
    top: ArcStr,
}

impl<'a> Flattener<'a> {
    fn new(resolver: &'a Resolver, options: &'a CompileOptions) -> Self {
        Self {
            resolver,
            options,
            arena: NetArena::new(),
            devices: Vec::new(),
            globals: IndexMap::new(),
            top: ArcStr::default(),
        }
    }

    fn run(mut self, top: Arc<Cell>, identity: Option<CellKey>) -> Result<FlatNetlist> {
        let _guard = span!(Level::INFO, "flatten", top = %top.name()).entered();
        self.top = top.name().clone();

        let (scope, params) = self.top_scope(&top)?;
        let root = self.enter(top.clone(), identity, InstancePath::top(), scope, None)?;
        let mut stack = vec![root];

        while let Some(frame) = stack.last_mut() {
            let Some((inst_name, resolved)) = frame.children.get(frame.next).cloned() else {
                stack.pop();
                continue;
            };
            frame.next += 1;

            let parent = frame.cell.clone();
            let inst = parent
                .schematic()
                .and_then(|s| s.instance(&inst_name))
                .expect("instance validated on level entry");
            let path = frame.path.child(inst_name.clone());
            let bindings: Vec<(ArcStr, NetKey)> = resolved
                .cell
                .ports()
                .map(|port| (port.name.clone(), frame.nets[&inst.connections()[&port.name]]))
                .collect();
            let scope = self.bind_params(&frame.scope, &frame.path, inst, &resolved.cell)?;

            match resolved.cell.contents() {
                CellContents::Primitive(device) => {
                    self.devices.push(PendingDevice {
                        path,
                        parent: parent.name().clone(),
                        cell: resolved.cell.name().clone(),
                        device: device.clone(),
                        ports: bindings.into_iter().map(|(_, key)| key).collect(),
                        params: scope,
                    });
                }
                CellContents::Schematic(_) => {
                    if let Some(start) = stack
                        .iter()
                        .position(|f| f.identity.as_ref() == Some(&resolved.key))
                    {
                        let mut cycle: Vec<ArcStr> =
                            stack[start..].iter().map(|f| f.cell.name().clone()).collect();
                        cycle.push(resolved.cell.name().clone());
                        return Err(Error::RecursiveHierarchy {
                            path,
                            cell: resolved.cell.name().clone(),
                            cycle,
                        });
                    }
                    let child = self.enter(
                        resolved.cell.clone(),
                        Some(resolved.key.clone()),
                        path,
                        scope,
                        Some(bindings),
                    )?;
                    stack.push(child);
                }
            }
        }

        Ok(self.finish(params))
    }

    /// Evaluates the parameters of the top cell.
    ///
    /// Returns the scope of the top level and the values of the parameters
    /// left symbolic.
    fn top_scope(
        &mut self,
        top: &Cell,
    ) -> Result<(IndexMap<ArcStr, Value>, IndexMap<ArcStr, Value>)> {
        let path = InstancePath::top();
        for name in self.options.params.keys().chain(self.options.symbolic.iter()) {
            if !top.params().contains_key(name) {
                return Err(Error::UndeclaredParameter {
                    path,
                    instance: top.name().clone(),
                    param: name.clone(),
                    cell: top.name().clone(),
                });
            }
        }

        // Concrete values first, so that symbolic parameters get a default.
        let concrete = self.eval_decls(top, &path, top.name(), &self.options.params, None)?;
        let params: IndexMap<ArcStr, Value> = self
            .options
            .symbolic
            .iter()
            .map(|name| (name.clone(), concrete[name].clone()))
            .collect();
        self.globals = params
            .keys()
            .map(|name| (name.clone(), Value::Symbolic(name.clone())))
            .collect();
        let scope = self.eval_decls(top, &path, top.name(), &self.options.params, Some(&self.options.symbolic))?;
        Ok((scope, params))
    }

    /// Binds the parameters of `inst` for the child level.
    ///
    /// Overrides are evaluated in the parent's scope, defaults in the child
    /// scope built so far.
    fn bind_params(
        &self,
        parent_scope: &IndexMap<ArcStr, Value>,
        path: &InstancePath,
        inst: &Instance,
        cell: &Cell,
    ) -> Result<IndexMap<ArcStr, Value>> {
        let mut overrides = IndexMap::new();
        let parent = Layered {
            local: parent_scope,
            globals: &self.globals,
        };
        for (param, text) in inst.params() {
            let value = eval_param(text, &parent, path, inst.name(), param)?;
            overrides.insert(param.clone(), value);
        }

        let mut scope = self.eval_values(cell, path, inst.name(), &mut overrides)?;
        if let Some(param) = overrides.keys().next() {
            match cell.contents() {
                // Primitives pass unknown parameters through to the simulator.
                CellContents::Primitive(_) => scope.extend(overrides),
                CellContents::Schematic(_) => {
                    return Err(Error::UndeclaredParameter {
                        path: path.clone(),
                        instance: inst.name().clone(),
                        param: param.clone(),
                        cell: cell.name().clone(),
                    })
                }
            }
        }
        Ok(scope)
    }

    /// Evaluates the declared parameters of `cell`, taking values from
    /// `overrides` where present.
    fn eval_values(
        &self,
        cell: &Cell,
        path: &InstancePath,
        instance: &ArcStr,
        overrides: &mut IndexMap<ArcStr, Value>,
    ) -> Result<IndexMap<ArcStr, Value>> {
        let mut scope = IndexMap::new();
        for (param, decl) in cell.params() {
            let value = match (overrides.shift_remove(param), &decl.default) {
                (Some(value), _) => value,
                (None, Some(default)) => {
                    let layered = Layered {
                        local: &scope,
                        globals: &self.globals,
                    };
                    eval_param(default, &layered, path, instance, param)?
                }
                (None, None) => {
                    return Err(Error::UnresolvedParameter {
                        path: path.clone(),
                        instance: instance.clone(),
                        param: param.clone(),
                        name: param.clone(),
                    })
                }
            };
            scope.insert(param.clone(), value);
        }
        Ok(scope)
    }

    /// Evaluates the top cell's declarations given override expressions.
    ///
    /// Parameters named in `symbolic` evaluate to themselves.
    fn eval_decls(
        &self,
        top: &Cell,
        path: &InstancePath,
        instance: &ArcStr,
        overrides: &IndexMap<ArcStr, ArcStr>,
        symbolic: Option<&indexmap::IndexSet<ArcStr>>,
    ) -> Result<IndexMap<ArcStr, Value>> {
        let empty: IndexMap<ArcStr, Value> = IndexMap::new();
        let mut values = IndexMap::new();
        for (param, text) in overrides {
            if symbolic.is_some_and(|s| s.contains(param)) {
                continue;
            }
            let value = eval_param(text, &empty, path, instance, param)?;
            values.insert(param.clone(), value);
        }
        if let Some(symbolic) = symbolic {
            for name in symbolic {
                values.insert(name.clone(), Value::Symbolic(name.clone()));
            }
        }
        self.eval_values(top, path, instance, &mut values)
    }

    /// Validates one level and registers its nets.
    ///
    /// Every child instance is resolved and checked here, before any of them
    /// is expanded, so errors are reported at the shallowest level.
    fn enter(
        &mut self,
        cell: Arc<Cell>,
        identity: Option<CellKey>,
        path: InstancePath,
        scope: IndexMap<ArcStr, Value>,
        bindings: Option<Vec<(ArcStr, NetKey)>>,
    ) -> Result<Frame> {
        let schematic = cell.schematic().ok_or_else(|| Error::NotSubcircuit {
            cell: cell.name().clone(),
        })?;
        tracing::debug!(%path, cell = %cell.name(), "expanding level");

        let mut nets = IndexMap::new();
        for net in schematic.nets() {
            if net.contains('.') {
                return Err(Error::InvalidName {
                    path,
                    name: net.clone(),
                });
            }
            let key = self.arena.declare(&path, cell.name(), net);
            if path.is_top() && self.options.is_ground(net) {
                self.arena.ground(&self.top, key);
            }
            nets.insert(net.clone(), key);
        }

        if let Some(bindings) = bindings {
            for (port, outer) in bindings {
                let inner = nets.get(&port).ok_or_else(|| Error::MissingPortNet {
                    cell: cell.name().clone(),
                    port: port.clone(),
                })?;
                self.arena.short(*inner, outer);
            }
        }

        for (a, b) in schematic.shorts() {
            let lookup = |net: &ArcStr| {
                nets.get(net).copied().ok_or_else(|| Error::UnknownNet {
                    path: path.clone(),
                    net: net.clone(),
                    referenced_by: arcstr::format!("short `{a}` = `{b}`"),
                })
            };
            let (a, b) = (lookup(a)?, lookup(b)?);
            self.arena.short(a, b);
        }

        let mut children = Vec::new();
        for inst in schematic.instances() {
            if inst.name().contains('.') {
                return Err(Error::InvalidName {
                    path,
                    name: inst.name().clone(),
                });
            }
            let resolved = self
                .resolver
                .resolve_ref(inst.cell())
                .map_err(|source| Error::Resolve {
                    path: path.clone(),
                    instance: inst.name().clone(),
                    cell: inst.cell().clone(),
                    source,
                })?;
            validate_connections(&path, inst, &resolved.cell, &nets)?;
            children.push((inst.name().clone(), resolved));
        }

        Ok(Frame {
            cell,
            identity,
            path,
            scope,
            nets,
            children,
            next: 0,
        })
    }

    fn finish(mut self, params: IndexMap<ArcStr, Value>) -> FlatNetlist {
        let mut names: IndexMap<usize, ArcStr> = IndexMap::new();
        let mut map = NetNameMap::new();

        for index in 0..self.arena.len() {
            let root = self.arena.representative(NetArena::key(index));
            let global = names
                .entry(root)
                .or_insert_with(|| self.arena.slot(root).qualified())
                .clone();
            if map.origin(&global).is_none() {
                map.add_net(global.clone(), self.alias(root));
            }
            if index != root {
                map.add_net(global, self.alias(index));
            }
        }

        for name in params.keys() {
            map.add_param(name.clone());
        }

        let mut nodes = Vec::with_capacity(self.devices.len());
        for pending in std::mem::take(&mut self.devices) {
            let nets: Vec<ArcStr> = pending
                .ports
                .iter()
                .map(|key| names[&self.arena.representative(*key)].clone())
                .collect();
            let name = ArcStr::from(pending.path.to_string());
            let element = pending.device.element(&name);
            map.add_device(
                name.clone(),
                DeviceOrigin {
                    element,
                    kind: pending.device.kind.clone(),
                    cell: pending.cell.clone(),
                    parent: pending.parent,
                    path: pending.path.clone(),
                },
            );
            nodes.push(FlatNetlistNode {
                name,
                path: pending.path,
                cell: pending.cell,
                device: pending.device,
                nets,
                params: pending.params,
            });
        }

        let lint = LintReport::analyze(&nodes, &map);
        tracing::info!(
            devices = nodes.len(),
            nets = map.num_nets(),
            issues = lint.len(),
            "flattened schematic"
        );
        FlatNetlist {
            top: self.top,
            nodes,
            nets: map,
            params,
            lint,
        }
    }
}

impl Flattener<'_> {
    fn alias(&self, index: usize) -> NetAlias {
        let slot = self.arena.slot(index);
        NetAlias {
            level: slot.level.clone(),
            local: slot.local.clone(),
            path: slot.path.clone(),
        }
    }
}

fn validate_connections(
    path: &InstancePath,
    inst: &Instance,
    cell: &Cell,
    nets: &IndexMap<ArcStr, NetKey>,
) -> Result<()> {
    for port in cell.ports() {
        if !inst.connections().contains_key(&port.name) {
            return Err(Error::UnconnectedPort {
                path: path.clone(),
                instance: inst.name().clone(),
                port: port.name.clone(),
                cell: cell.name().clone(),
            });
        }
    }
    for (port, net) in inst.connections() {
        if cell.port(port).is_none() {
            return Err(Error::UnknownPort {
                path: path.clone(),
                instance: inst.name().clone(),
                port: port.clone(),
                cell: cell.name().clone(),
            });
        }
        if !nets.contains_key(net) {
            return Err(Error::UnknownNet {
                path: path.clone(),
                net: net.clone(),
                referenced_by: arcstr::format!("port `{port}` of instance `{}`", inst.name()),
            });
        }
    }
    Ok(())
}

fn eval_param(
    text: &str,
    scope: &dyn Scope,
    path: &InstancePath,
    instance: &ArcStr,
    param: &ArcStr,
) -> Result<Value> {
    let invalid = |reason: String| Error::InvalidExpression {
        path: path.clone(),
        instance: instance.clone(),
        param: param.clone(),
        reason,
    };
    let expr = Expr::parse(text).map_err(|e| invalid(e.to_string()))?;
    expr.eval(scope).map_err(|e| match e {
        EvalError::Unresolved(name) => Error::UnresolvedParameter {
            path: path.clone(),
            instance: instance.clone(),
            param: param.clone(),
            name,
        },
        other => invalid(other.to_string()),
    })
}
