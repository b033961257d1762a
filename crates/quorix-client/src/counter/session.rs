use crate::session::{SessionHandler, created_header};
use quorix_core::{
    Result,
    proto::{
        counter::{
            CloseRequest, CreateRequest, KeepAliveRequest,
            counter_service_client::CounterServiceClient,
        },
        headers::{Header, PrimitiveId},
    },
};
use tonic::transport::Channel;

/// Session RPCs of the counter service.
#[derive(Debug, Clone)]
pub struct CounterSession {
    client: CounterServiceClient<Channel>,
    id: PrimitiveId,
    client_id: String,
}

impl CounterSession {
    pub fn new(client: CounterServiceClient<Channel>, id: PrimitiveId, client_id: String) -> Self {
        Self {
            client,
            id,
            client_id,
        }
    }
}

impl SessionHandler for CounterSession {
    async fn create(&self, header: Header) -> Result<Header> {
        let response = self
            .client
            .clone()
            .create(CreateRequest {
                header: Some(header),
                id: Some(self.id.clone()),
                client_id: self.client_id.clone(),
            })
            .await?;
        created_header(response.into_inner().header)
    }

    async fn keep_alive(&self, header: Header) -> Result<()> {
        self.client
            .clone()
            .keep_alive(KeepAliveRequest {
                header: Some(header),
            })
            .await?;
        Ok(())
    }

    async fn close(&self, header: Header, delete: bool) -> Result<()> {
        self.client
            .clone()
            .close(CloseRequest {
                header: Some(header),
                delete,
            })
            .await?;
        Ok(())
    }
}
