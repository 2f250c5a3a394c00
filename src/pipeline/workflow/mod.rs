
use tracing::debug;

use super::materialize::{DatasetLayout, MaterializeOutcome, MaterializeRequest, SamplingStrategy};
use super::metadata::{MetadataKeySet, extract_keys};
use super::sample::sample;
use crate::dataapi::{Document, VectorDatabase};
use crate::source::{CollectionDescriptor, ConnectionInfo, SourceRef, TableDescriptor};
use crate::{ProjectorError, Result};

/// Choices accumulated while walking through the preparation steps.
///
/// Each step clears whatever was derived from an earlier choice, so a new
/// source selection never carries over a stale sample or key set.
#[derive(Debug, Clone)]
pub struct WorkflowState {
    connection: ConnectionInfo,
    source: Option<SourceRef>,
    vector_dimension: Option<usize>,
    sample: Vec<Document>,
    keys: Option<MetadataKeySet>,
    selected_keys: Vec<String>,
}

impl WorkflowState {
    #[inline]
    pub const fn new(connection: ConnectionInfo) -> Self {
        Self {
            connection,
            source: None,
            vector_dimension: None,
            sample: Vec::new(),
            keys: None,
            selected_keys: Vec::new(),
        }
    }

    #[inline]
    pub const fn connection(&self) -> &ConnectionInfo {
        &self.connection
    }

    #[inline]
    pub const fn source(&self) -> Option<&SourceRef> {
        self.source.as_ref()
    }

    #[inline]
    pub const fn vector_dimension(&self) -> Option<usize> {
        self.vector_dimension
    }

    #[inline]
    pub fn sample_rows(&self) -> &[Document] {
        &self.sample
    }

    #[inline]
    pub const fn keys(&self) -> Option<&MetadataKeySet> {
        self.keys.as_ref()
    }

    #[inline]
    pub fn selected_keys(&self) -> &[String] {
        &self.selected_keys
    }

    #[inline]
    pub fn select_collection(&mut self, collection: &CollectionDescriptor) {
        self.set_source(SourceRef::collection(&collection.name), collection.dimension);
    }

    #[inline]
    pub fn select_table(&mut self, table: &TableDescriptor, vector_column: &str) -> Result<()> {
        let column = table.vector_column(vector_column).ok_or_else(|| {
            ProjectorError::validation(format!(
                "Table '{}' has no vector column '{}'",
                table.name, vector_column
            ))
        })?;
        self.set_source(table.source_ref(&column.name), column.dimension);
        Ok(())
    }

    fn set_source(&mut self, source: SourceRef, dimension: usize) {
        debug!("Selected {} ({} dimensions)", source, dimension);
        self.source = Some(source);
        self.vector_dimension = Some(dimension);
        self.sample.clear();
        self.keys = None;
        self.selected_keys.clear();
    }

    fn selected_source(&self) -> Result<&SourceRef> {
        self.source
            .as_ref()
            .ok_or_else(|| ProjectorError::validation("No collection or table has been selected"))
    }

    /// Preview rows of the selected source and derive the candidate keys
    #[inline]
    pub fn take_sample<D>(&mut self, db: &D) -> Result<&MetadataKeySet>
    where
        D: VectorDatabase + ?Sized,
    {
        let source = self.selected_source()?;
        let rows = sample(db, source)?;
        let keys = extract_keys(&rows, source.vector_field())?;

        self.selected_keys = keys
            .default_selected()
            .into_iter()
            .map(str::to_string)
            .collect();
        self.sample = rows;
        Ok(self.keys.insert(keys))
    }

    /// Replace the key selection; every key must come from the sample
    #[inline]
    pub fn select_keys<I, S>(&mut self, keys: I) -> Result<()>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let available = self
            .keys
            .as_ref()
            .ok_or_else(|| ProjectorError::validation("Sample the source before choosing keys"))?;

        let keys: Vec<String> = keys.into_iter().map(Into::into).collect();
        if let Some(unknown) = keys.iter().find(|key| !available.contains(key)) {
            return Err(ProjectorError::validation(format!(
                "'{}' is not a key of the sampled rows",
                unknown
            )));
        }

        self.selected_keys = keys;
        Ok(())
    }

    /// Materialization request from the current choices
    #[inline]
    pub fn request(
        &self,
        tensor_name: &str,
        document_limit: Option<usize>,
        sampling_strategy: SamplingStrategy,
    ) -> Result<MaterializeRequest> {
        let source = self.selected_source()?.clone();
        let vector_dimension = self
            .vector_dimension
            .ok_or_else(|| ProjectorError::validation("Vector dimension is unknown"))?;

        let request = MaterializeRequest {
            source,
            vector_dimension,
            tensor_name: tensor_name.to_string(),
            metadata_keys: self.selected_keys.clone(),
            document_limit,
            sampling_strategy,
        };
        request.validate()?;
        Ok(request)
    }

    #[inline]
    pub fn materialize<D>(
        &self,
        db: &D,
        layout: &DatasetLayout,
        tensor_name: &str,
        document_limit: Option<usize>,
        sampling_strategy: SamplingStrategy,
    ) -> Result<MaterializeOutcome>
    where
        D: VectorDatabase + ?Sized,
    {
        let request = self.request(tensor_name, document_limit, sampling_strategy)?;
        super::materialize::materialize(db, &request, layout)
    }
}
