//! The upstream reference-data provider seam.

use async_trait::async_trait;
use std::sync::Arc;

use crate::error::RefDataResult;
use crate::request::{ReferenceDataRequest, ReferenceDataResponse};

/// A source of reference data.
///
/// Implemented by the real upstream (a market-data vendor connection) and by
/// every caching decorator, so decorators stack. Implementations must accept
/// arbitrary sub-partitions of a caller's identifier and field sets.
///
/// Per-identifier failures belong in the response records' error lists;
/// `Err` is reserved for failures of the whole call (network, timeout).
#[async_trait]
pub trait ReferenceDataProvider: Send + Sync {
    /// Fetch reference data for every identifier in the request.
    async fn get_reference_data(
        &self,
        request: &ReferenceDataRequest,
    ) -> RefDataResult<ReferenceDataResponse>;
}

#[async_trait]
impl<P: ReferenceDataProvider + ?Sized> ReferenceDataProvider for Arc<P> {
    async fn get_reference_data(
        &self,
        request: &ReferenceDataRequest,
    ) -> RefDataResult<ReferenceDataResponse> {
        (**self).get_reference_data(request).await
    }
}

#[async_trait]
impl<P: ReferenceDataProvider + ?Sized> ReferenceDataProvider for Box<P> {
    async fn get_reference_data(
        &self,
        request: &ReferenceDataRequest,
    ) -> RefDataResult<ReferenceDataResponse> {
        (**self).get_reference_data(request).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::ReferenceData;
    use serde_json::json;

    struct EchoProvider;

    #[async_trait]
    impl ReferenceDataProvider for EchoProvider {
        async fn get_reference_data(
            &self,
            request: &ReferenceDataRequest,
        ) -> RefDataResult<ReferenceDataResponse> {
            Ok(request
                .identifiers()
                .iter()
                .map(|id| {
                    let mut record = ReferenceData::new(id.clone());
                    for field in request.fields() {
                        record.add_field_value(field.clone(), json!(id));
                    }
                    record
                })
                .collect())
        }
    }

    #[tokio::test]
    async fn test_shared_provider_delegates() {
        let provider: Arc<dyn ReferenceDataProvider> = Arc::new(EchoProvider);
        let request = ReferenceDataRequest::new(["SEC1", "SEC2"], ["NAME"], true)
            .expect("request should be valid");

        let response = provider
            .get_reference_data(&request)
            .await
            .expect("call should succeed");
        assert_eq!(response.len(), 2);
        assert_eq!(
            response.get("SEC2").and_then(|r| r.field_values().first("NAME")),
            Some(&json!("SEC2"))
        );
    }
}
