use std::sync::Arc;

use super::{FinderFuture, ResourceFinder, require_body};
use crate::datasource::DataSource;
use crate::identifier::Scheme;
use crate::record::ResolutionRecord;

/// Offline finder answering from a preloaded OpenCitations Meta data map.
///
/// Identifiers absent from the map are invalid.
pub struct OcMetaFinder {
    data: Arc<dyn DataSource>,
    scheme: Scheme,
}

impl OcMetaFinder {
    pub fn new(data: Arc<dyn DataSource>, scheme: Scheme) -> Self {
        Self { data, scheme }
    }
}

impl ResourceFinder for OcMetaFinder {
    fn name(&self) -> &str {
        "OpenCitations Meta"
    }

    fn scheme(&self) -> Scheme {
        self.scheme
    }

    fn fetch<'a>(&'a self, id: &'a str) -> FinderFuture<'a> {
        Box::pin(async move {
            let body = require_body(self.scheme, id)?;
            let key = format!("{}{}", self.scheme.prefix(), body);
            Ok(self
                .data
                .get(&key)?
                .unwrap_or_else(ResolutionRecord::invalid))
        })
    }
}
