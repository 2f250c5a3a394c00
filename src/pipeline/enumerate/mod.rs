#[cfg(test)]
mod tests;

use tracing::{debug, info, warn};

use crate::dataapi::{CollectionDefinition, TableDefinition, VectorDatabase};
use crate::source::{
    CollectionDescriptor, EstimatedCount, SourceKind, TableDescriptor, VectorColumn,
};
use crate::{ProjectorError, Result};

/// List vector-enabled collections with an estimated document count each.
///
/// Collections without a positive vector dimension (plain collections and
/// vectorize-only ones that never reported a dimension) are left out.
#[inline]
pub fn list_collections<D>(db: &D) -> Result<Vec<CollectionDescriptor>>
where
    D: VectorDatabase + ?Sized,
{
    let definitions = db.list_collections()?;
    debug!("Data API reported {} collections", definitions.len());

    let collections: Vec<CollectionDescriptor> = definitions
        .into_iter()
        .filter_map(|definition| {
            let dimension = collection_dimension(&definition)?;

            let count = match db.estimated_count(&definition.name) {
                Ok(Some(count)) => EstimatedCount::Known(count),
                Ok(None) => EstimatedCount::NotAvailable,
                Err(e) => {
                    warn!(
                        "Could not estimate document count for '{}': {}",
                        definition.name, e
                    );
                    EstimatedCount::Error
                }
            };

            Some(CollectionDescriptor {
                name: definition.name,
                dimension,
                count,
            })
        })
        .collect();

    if collections.is_empty() {
        return Err(ProjectorError::NoSources(SourceKind::Collection));
    }

    info!("Found {} vector-enabled collections", collections.len());
    Ok(collections)
}

/// Positive vector dimension of a collection, if it has one
fn collection_dimension(definition: &CollectionDefinition) -> Option<usize> {
    let Some(vector) = &definition.vector else {
        debug!("Skipping '{}': not a vector collection", definition.name);
        return None;
    };

    let dimension = vector.dimension.filter(|dimension| *dimension > 0);
    if dimension.is_none() {
        if vector.vectorize {
            debug!(
                "Skipping '{}': vectorize collection without a reported dimension",
                definition.name
            );
        } else {
            debug!("Skipping '{}': no positive vector dimension", definition.name);
        }
    }
    dimension
}

/// List tables that have at least one vector column with a known dimension
#[inline]
pub fn list_tables<D>(db: &D) -> Result<Vec<TableDescriptor>>
where
    D: VectorDatabase + ?Sized,
{
    let definitions = db.list_tables()?;
    debug!("Data API reported {} tables", definitions.len());

    let tables: Vec<TableDescriptor> = definitions
        .into_iter()
        .filter_map(describe_table)
        .collect();

    if tables.is_empty() {
        return Err(ProjectorError::NoSources(SourceKind::Table));
    }

    info!("Found {} vector-enabled tables", tables.len());
    Ok(tables)
}

fn describe_table(definition: TableDefinition) -> Option<TableDescriptor> {
    let vector_columns: Vec<VectorColumn> = definition
        .columns
        .iter()
        .filter(|column| column.is_vector())
        .filter_map(|column| {
            let dimension = column.dimension.filter(|dimension| *dimension > 0)?;
            Some(VectorColumn {
                name: column.name.clone(),
                dimension,
            })
        })
        .collect();

    if vector_columns.is_empty() {
        debug!("Skipping table '{}': no usable vector column", definition.name);
        return None;
    }

    let primary_key_columns: Vec<String> = definition
        .partition_by
        .iter()
        .chain(&definition.partition_sort)
        .cloned()
        .collect();

    let partition_key_columns = if definition.partition_by.is_empty() {
        primary_key_columns.clone()
    } else {
        definition.partition_by
    };

    Some(TableDescriptor {
        name: definition.name,
        vector_columns,
        primary_key_columns,
        partition_key_columns,
        count: EstimatedCount::NotAvailable,
    })
}
