#[cfg(test)]
mod tests;

use tracing::{debug, warn};

use crate::dataapi::{Document, FindQuery, VectorDatabase, WILDCARD_PROJECTION};
use crate::source::SourceRef;
use crate::{ProjectorError, Result};

/// Rows fetched for a preview
pub const SAMPLE_PAGE_SIZE: usize = 10;

/// Fetch a small preview of rows from a source.
///
/// Collections are queried with a wildcard projection so `$vector` is
/// returned alongside every other field.
#[inline]
pub fn sample<D>(db: &D, source: &SourceRef) -> Result<Vec<Document>>
where
    D: VectorDatabase + ?Sized,
{
    source.validate()?;

    let mut query = FindQuery::default().with_limit(Some(SAMPLE_PAGE_SIZE));
    if let SourceRef::Collection { .. } = source {
        query = query.with_projection([WILDCARD_PROJECTION]);
    }

    debug!("Sampling {} rows from {}", SAMPLE_PAGE_SIZE, source);
    let mut rows = db.find(source.kind(), source.name(), &query)?.documents;
    rows.truncate(SAMPLE_PAGE_SIZE);

    if rows.is_empty() {
        return Err(ProjectorError::EmptySample(source.name().to_string()));
    }

    let vector_field = source.vector_field();
    let missing = rows
        .iter()
        .filter(|row| !row.contains_key(vector_field))
        .count();
    if missing > 0 {
        warn!(
            "{} of {} sampled rows from {} have no '{}' field",
            missing,
            rows.len(),
            source,
            vector_field
        );
    }

    Ok(rows)
}
