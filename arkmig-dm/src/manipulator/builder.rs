//! Build a [`ManipulatorChain`] from configuration

use arkmig_common::config::ManipulatorConfig;
use arkmig_common::Result;
use std::sync::Arc;
use tracing::info;

use super::{
    DataManipulator, DataSetter, ManipulatorChain, RecordFilter, RegexReplacer, RowDuplicator,
    ValueMapper,
};
use crate::reconcile::{ForeignKeyCleaner, ForeignKeyDeleter, PrimaryKeyAdder, ReconcileContext};

/// Construct every configured manipulator, in file order
///
/// Any unknown table or field, unparseable value or invalid pattern fails the
/// whole build.
pub fn build_chain(configs: &[ManipulatorConfig], ctx: &ReconcileContext) -> Result<ManipulatorChain> {
    let metadata = ctx.metadata.as_ref();
    let mut chain = ManipulatorChain::new();

    for config in configs {
        let manipulator: Arc<dyn DataManipulator> = match config {
            ManipulatorConfig::DataSetter {
                table,
                field,
                value,
                criteria,
            } => Arc::new(DataSetter::new(metadata, table, field, value, criteria)?),
            ManipulatorConfig::RegexReplacer {
                table,
                field,
                pattern,
                value,
                mode,
            } => Arc::new(RegexReplacer::new(
                metadata, table, field, pattern, value, *mode,
            )?),
            ManipulatorConfig::RowDuplicator {
                table,
                criteria,
                updates,
            } => Arc::new(RowDuplicator::new(metadata, table, criteria, updates)?),
            ManipulatorConfig::ValueMapper { table } => Arc::new(ValueMapper::new(metadata, table)?),
            ManipulatorConfig::RecordFilter { table } => {
                Arc::new(RecordFilter::new(metadata, table)?)
            }
            ManipulatorConfig::ForeignKeyCleaner {
                table,
                foreign_table,
                fields,
                extra_criteria,
            } => Arc::new(ForeignKeyCleaner::new(
                ctx.clone(),
                table,
                foreign_table,
                fields,
                extra_criteria,
            )?),
            ManipulatorConfig::ForeignKeyDeleter {
                table,
                foreign_table,
                fields,
                extra_criteria,
            } => Arc::new(ForeignKeyDeleter::new(
                ctx.clone(),
                table,
                foreign_table,
                fields,
                extra_criteria,
            )?),
            ManipulatorConfig::PrimaryKeyAdder {
                table,
                foreign_table,
                fields,
                defaults,
            } => Arc::new(PrimaryKeyAdder::new(
                ctx.clone(),
                table,
                foreign_table,
                fields,
                defaults,
            )?),
        };

        info!("Registered {} on {}", manipulator.kind(), config.table());
        chain.register(manipulator);
    }

    Ok(chain)
}
