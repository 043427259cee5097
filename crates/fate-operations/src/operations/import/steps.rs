use fate_core::{TableId, TableState, TxId};
use fate_saga::{LeaseKey, Readiness, SagaStep};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::context::{ImportContext, scratch_node, scratch_root};
use super::mapping::{imported_extension, mapping_path, read_mapping, write_mapping};
use super::metadata::RowRewrite;
use crate::context::MasterContext;
use crate::export::{EXPORT_FILE, ExportArchive};
use crate::tables::TableManager;
use crate::types::{METADATA_TABLE, NodeExistsPolicy, RowRange, TablePermission, file_name, join_path};
use crate::{OperationError, Result};

/// Serialises table id allocation across transactions.
pub const TABLE_CREATION_LEASE: &str = "table-creation";

const LEASE_RETRY_MS: u64 = 50;
const REGISTRATION_RETRY_MS: u64 = 100;

/// The phases of a table import, in execution order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "phase", content = "import", rename_all = "snake_case")]
pub enum ImportStep {
    ReserveExportDir(ImportContext),
    AssignTableId(ImportContext),
    RegisterTable(ImportContext),
    AllocateImportDir(ImportContext),
    BuildFileNameMapping(ImportContext),
    RewriteMetadataRows(ImportContext),
    MoveExportedFiles(ImportContext),
    Finalize(ImportContext),
}

impl ImportStep {
    #[must_use]
    pub fn context(&self) -> &ImportContext {
        match self {
            Self::ReserveExportDir(ctx)
            | Self::AssignTableId(ctx)
            | Self::RegisterTable(ctx)
            | Self::AllocateImportDir(ctx)
            | Self::BuildFileNameMapping(ctx)
            | Self::RewriteMetadataRows(ctx)
            | Self::MoveExportedFiles(ctx)
            | Self::Finalize(ctx) => ctx,
        }
    }
}

impl SagaStep for ImportStep {
    type Context = MasterContext;
    type Error = OperationError;

    fn name(&self) -> &'static str {
        match self {
            Self::ReserveExportDir(_) => "reserve_export_dir",
            Self::AssignTableId(_) => "assign_table_id",
            Self::RegisterTable(_) => "register_table",
            Self::AllocateImportDir(_) => "allocate_import_dir",
            Self::BuildFileNameMapping(_) => "build_file_name_mapping",
            Self::RewriteMetadataRows(_) => "rewrite_metadata_rows",
            Self::MoveExportedFiles(_) => "move_exported_files",
            Self::Finalize(_) => "finalize_import",
        }
    }

    fn readiness(&self, tx: TxId, env: &MasterContext) -> Result<Readiness> {
        let ctx = self.context();
        match self {
            Self::ReserveExportDir(_) => {
                let key = LeaseKey::path(&ctx.source_export_dir);
                Ok(lease_readiness(env.leases().try_acquire(&key, tx, true)?))
            }
            Self::AssignTableId(_) => {
                let key = LeaseKey::global(TABLE_CREATION_LEASE);
                Ok(lease_readiness(env.leases().try_acquire(&key, tx, true)?))
            }
            Self::RegisterTable(_) => {
                let id = ctx.require_table_id(self.name())?;
                let table = env.leases().try_acquire(&LeaseKey::table(id), tx, true)?;
                let name = table
                    && env
                        .leases()
                        .try_acquire(&LeaseKey::table_name(&ctx.table_name), tx, true)?;
                if name {
                    Ok(Readiness::Ready)
                } else {
                    Ok(Readiness::retry_after_millis(REGISTRATION_RETRY_MS))
                }
            }
            Self::RewriteMetadataRows(_) | Self::MoveExportedFiles(_) => {
                let dir = ctx.require_import_dir(self.name())?;
                if env.files().exists(&mapping_path(dir))? {
                    Ok(Readiness::Ready)
                } else {
                    Ok(Readiness::retry_after_millis(REGISTRATION_RETRY_MS))
                }
            }
            Self::AllocateImportDir(_) | Self::BuildFileNameMapping(_) | Self::Finalize(_) => {
                Ok(Readiness::Ready)
            }
        }
    }

    fn execute(&mut self, tx: TxId, env: &MasterContext) -> Result<Option<Self>> {
        let name = self.name();
        match self {
            Self::ReserveExportDir(ctx) => {
                hold(env, &LeaseKey::path(&ctx.source_export_dir), tx)?;
                debug!(%tx, export_dir = %ctx.source_export_dir, "reserved export directory");
                Ok(Some(Self::AssignTableId(ctx.clone())))
            }
            Self::AssignTableId(ctx) => {
                hold(env, &LeaseKey::global(TABLE_CREATION_LEASE), tx)?;
                let id = assign_table_id(tx, env)?;
                ctx.table_id = Some(id.clone());
                for permission in TablePermission::ALL {
                    env.permissions()
                        .grant_table_permission(&ctx.importing_user, &id, permission)?;
                }
                env.leases()
                    .release(&LeaseKey::global(TABLE_CREATION_LEASE), tx)?;
                debug!(%tx, table = %ctx.table_name, table_id = %id, "assigned table id");
                Ok(Some(Self::RegisterTable(ctx.clone())))
            }
            Self::RegisterTable(ctx) => {
                let id = ctx.require_table_id(name)?.clone();
                if let Err(e) = register_table(tx, env, ctx, &id) {
                    // The step is not completed, so nothing else undoes a
                    // partial registration.
                    TableManager::new(env.namespace()).remove_table(&id)?;
                    release_table_leases(tx, env, ctx, &id)?;
                    return Err(e);
                }
                debug!(%tx, table = %ctx.table_name, table_id = %id, "registered table");
                Ok(Some(Self::AllocateImportDir(ctx.clone())))
            }
            Self::AllocateImportDir(ctx) => {
                let id = ctx.require_table_id(name)?.clone();
                let dir_name = scratch_value(tx, env, "dir-name", || env.names().next_name())?;
                let dir = join_path(
                    &env.import_config().tables_dir,
                    &format!("{id}/b-{dir_name}"),
                );
                env.files().mkdirs(&dir)?;
                debug!(%tx, table_id = %id, import_dir = %dir, "allocated import directory");
                ctx.import_dir = Some(dir);
                Ok(Some(Self::BuildFileNameMapping(ctx.clone())))
            }
            Self::BuildFileNameMapping(ctx) => {
                let dir = ctx.require_import_dir(name)?.to_string();
                ctx.file_name_mapping = build_mapping(env, ctx, &dir)?;
                debug!(%tx, files = ctx.file_name_mapping.len(), "wrote file name mapping");
                Ok(Some(Self::RewriteMetadataRows(ctx.clone())))
            }
            Self::RewriteMetadataRows(ctx) => {
                let id = ctx.require_table_id(name)?;
                let dir = ctx.require_import_dir(name)?;
                let mapping = read_mapping(env.files(), dir)?;
                let archive = ExportArchive::open(env.files(), &ctx.source_export_dir)?;
                let mutations = RowRewrite {
                    table_name: &ctx.table_name,
                    table_id: id,
                    bulk_dir: file_name(dir),
                    mapping: &mapping,
                    source: &join_path(&ctx.source_export_dir, EXPORT_FILE),
                }
                .apply(archive.metadata()?)?;

                let tablets = mutations.len();
                let mut writer = env.metadata().open_writer(METADATA_TABLE)?;
                for mutation in mutations {
                    writer.add(mutation)?;
                }
                writer.close()?;
                debug!(%tx, table_id = %id, tablets, "wrote metadata rows");
                Ok(Some(Self::MoveExportedFiles(ctx.clone())))
            }
            Self::MoveExportedFiles(ctx) => {
                move_exported_files(env, ctx, name)?;
                debug!(%tx, files = ctx.file_name_mapping.len(), "moved exported files");
                Ok(Some(Self::Finalize(ctx.clone())))
            }
            Self::Finalize(ctx) => {
                let id = ctx.require_table_id(name)?.clone();
                let dir = ctx.require_import_dir(name)?;
                env.files().delete(&mapping_path(dir), false)?;
                TableManager::new(env.namespace()).transition_state(&id, TableState::Online)?;
                release_table_leases(tx, env, ctx, &id)?;
                env.leases()
                    .release(&LeaseKey::path(&ctx.source_export_dir), tx)?;
                env.namespace().delete(&scratch_root(tx))?;
                env.events()
                    .event(&format!("Imported table {}", ctx.table_name));
                info!(%tx, table = %ctx.table_name, table_id = %id, "table imported");
                Ok(None)
            }
        }
    }

    fn compensate(&self, tx: TxId, env: &MasterContext) -> Result<()> {
        let ctx = self.context();
        match self {
            Self::ReserveExportDir(_) => {
                env.namespace().delete(&scratch_root(tx))?;
                env.leases()
                    .release(&LeaseKey::path(&ctx.source_export_dir), tx)?;
            }
            Self::AssignTableId(_) => {
                if let Some(id) = &ctx.table_id {
                    env.permissions().delete_table(id)?;
                }
                env.leases()
                    .release(&LeaseKey::global(TABLE_CREATION_LEASE), tx)?;
            }
            Self::RegisterTable(_) => {
                if let Some(id) = &ctx.table_id {
                    TableManager::new(env.namespace()).remove_table(id)?;
                    release_table_leases(tx, env, ctx, id)?;
                }
            }
            Self::AllocateImportDir(_) | Self::BuildFileNameMapping(_) => {
                discard_import_dir(env, ctx)?;
            }
            Self::RewriteMetadataRows(_) => {
                if let Some(id) = &ctx.table_id {
                    let removed = env
                        .metadata()
                        .delete_rows(METADATA_TABLE, &RowRange::table(id))?;
                    debug!(%tx, table_id = %id, removed, "deleted metadata rows");
                }
            }
            Self::MoveExportedFiles(_) => {
                if let Some(dir) = ctx.import_dir.as_deref() {
                    move_files_back(env, ctx, dir, &ctx.file_name_mapping)?;
                }
            }
            Self::Finalize(_) => {}
        }
        Ok(())
    }

    fn result(&self) -> Option<String> {
        match self {
            Self::Finalize(ctx) => ctx.table_id.as_ref().map(ToString::to_string),
            _ => None,
        }
    }

    fn compensation_description(&self) -> String {
        let ctx = self.context();
        match self {
            Self::ReserveExportDir(_) => {
                format!("release export directory {}", ctx.source_export_dir)
            }
            Self::AssignTableId(_) => format!("revoke permissions on table {}", ctx.table_name),
            Self::RegisterTable(_) => format!("unregister table {}", ctx.table_name),
            Self::AllocateImportDir(_) | Self::BuildFileNameMapping(_) => format!(
                "delete import directory {}",
                ctx.import_dir.as_deref().unwrap_or("<unallocated>")
            ),
            Self::RewriteMetadataRows(_) => {
                format!("delete metadata rows of table {}", ctx.table_name)
            }
            Self::MoveExportedFiles(_) => {
                format!("move files back to {}", ctx.source_export_dir)
            }
            Self::Finalize(_) => "nothing, the import is committed".to_string(),
        }
    }
}

fn lease_readiness(acquired: bool) -> Readiness {
    if acquired {
        Readiness::Ready
    } else {
        Readiness::retry_after_millis(LEASE_RETRY_MS)
    }
}

/// Re-takes a lease the step's readiness check acquired.
fn hold(env: &MasterContext, key: &LeaseKey, tx: TxId) -> Result<()> {
    if env.leases().try_acquire(key, tx, true)? {
        Ok(())
    } else {
        Err(OperationError::LeaseUnavailable {
            key: key.to_string(),
        })
    }
}

/// Returns the value recorded under the transaction's scratch `leaf`, or
/// records a freshly produced one.
fn scratch_value(
    tx: TxId,
    env: &MasterContext,
    leaf: &str,
    produce: impl FnOnce() -> Result<String>,
) -> Result<String> {
    let node = scratch_node(tx, leaf);
    if let Some(value) = env.namespace().get_string(&node)? {
        return Ok(value);
    }
    let value = produce()?;
    env.namespace()
        .put(&node, value.as_bytes(), NodeExistsPolicy::Overwrite)?;
    Ok(value)
}

fn assign_table_id(tx: TxId, env: &MasterContext) -> Result<TableId> {
    let node = scratch_node(tx, "table-id");
    let value = scratch_value(tx, env, "table-id", || {
        TableManager::new(env.namespace())
            .next_table_id()
            .map(String::from)
    })?;
    value.parse().map_err(|_| OperationError::CorruptNode {
        path: node,
        reason: format!("'{value}' is not a table id"),
    })
}

fn register_table(tx: TxId, env: &MasterContext, ctx: &ImportContext, id: &TableId) -> Result<()> {
    hold(env, &LeaseKey::table(id), tx)?;
    hold(env, &LeaseKey::table_name(&ctx.table_name), tx)?;

    let properties = ExportArchive::open(env.files(), &ctx.source_export_dir)?.table_config()?;
    if let Some((key, _)) = properties
        .iter()
        .find(|(key, _)| !TableManager::is_valid_property(key))
    {
        return Err(OperationError::InvalidTableProperty {
            table: ctx.table_name.clone(),
            table_id: id.clone(),
            key: key.clone(),
        });
    }

    let tables = TableManager::new(env.namespace());
    if let Some(existing) = tables.table_id_for_name(&ctx.table_name)? {
        if existing != *id {
            return Err(OperationError::TableExists {
                name: ctx.table_name.clone(),
                existing,
            });
        }
    }
    tables.add_table(id, &ctx.table_name)?;
    for (key, value) in &properties {
        tables.set_property(id, key, value)?;
    }
    Ok(())
}

fn release_table_leases(
    tx: TxId,
    env: &MasterContext,
    ctx: &ImportContext,
    id: &TableId,
) -> Result<()> {
    env.leases().release(&LeaseKey::table(id), tx)?;
    env.leases()
        .release(&LeaseKey::table_name(&ctx.table_name), tx)?;
    Ok(())
}

fn build_mapping(
    env: &MasterContext,
    ctx: &ImportContext,
    import_dir: &str,
) -> Result<IndexMap<String, String>> {
    env.files().mkdirs(import_dir)?;
    if env.files().exists(&mapping_path(import_dir))? {
        return read_mapping(env.files(), import_dir);
    }

    let config = env.import_config();
    let mut mapping = IndexMap::new();
    for exported in env.files().list(&ctx.source_export_dir)? {
        let Some(extension) = imported_extension(&exported, config) else {
            continue;
        };
        let new_name = format!("I{}.{extension}", env.names().next_name()?);
        mapping.insert(exported, new_name);
    }
    write_mapping(env.files(), import_dir, &mapping)?;
    Ok(mapping)
}

fn move_exported_files(env: &MasterContext, ctx: &ImportContext, phase: &'static str) -> Result<()> {
    let id = ctx.require_table_id(phase)?;
    let dir = ctx.require_import_dir(phase)?;
    let mapping = read_mapping(env.files(), dir)?;
    let files = env.files();

    let mut pending = Vec::new();
    for (old, new) in &mapping {
        let source = join_path(&ctx.source_export_dir, old);
        let target = join_path(dir, new);
        if files.exists(&source)? {
            pending.push((source, target));
        } else if !files.exists(&target)? {
            return Err(OperationError::MissingReferencedFile {
                table: ctx.table_name.clone(),
                table_id: id.clone(),
                file: source,
            });
        }
    }
    for (source, target) in pending {
        files.rename(&source, &target)?;
    }
    Ok(())
}

fn move_files_back(
    env: &MasterContext,
    ctx: &ImportContext,
    dir: &str,
    mapping: &IndexMap<String, String>,
) -> Result<()> {
    let files = env.files();
    for (old, new) in mapping {
        let source = join_path(&ctx.source_export_dir, old);
        let target = join_path(dir, new);
        if files.exists(&target)? && !files.exists(&source)? {
            files.rename(&target, &source)?;
        }
    }
    Ok(())
}

// Files moved in by a move that failed halfway still belong to the export, so
// they go back before the directory is removed. Without a completed mapping
// step the mapping file on disk, if any, says what may have moved.
fn discard_import_dir(env: &MasterContext, ctx: &ImportContext) -> Result<()> {
    let Some(dir) = ctx.import_dir.as_deref() else {
        return Ok(());
    };
    let files = env.files();
    if files.exists(dir)? {
        if !ctx.file_name_mapping.is_empty() {
            move_files_back(env, ctx, dir, &ctx.file_name_mapping)?;
        } else if files.exists(&mapping_path(dir))? {
            move_files_back(env, ctx, dir, &read_mapping(files, dir)?)?;
        }
        files.delete(dir, true)?;
    }

    if let Some(id) = &ctx.table_id {
        let table_dir = join_path(&env.import_config().tables_dir, &id.to_string());
        if files.exists(&table_dir)? && files.list(&table_dir)?.is_empty() {
            files.delete(&table_dir, false)?;
        }
    }
    Ok(())
}
