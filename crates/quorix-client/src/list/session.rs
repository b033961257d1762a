use crate::session::{SessionHandler, created_header};
use quorix_core::{
    Result,
    proto::{
        headers::{Header, PrimitiveId},
        list::{
            CloseRequest, CreateRequest, KeepAliveRequest, list_service_client::ListServiceClient,
        },
    },
};
use tonic::transport::Channel;

/// Session RPCs of the list service.
#[derive(Debug, Clone)]
pub struct ListSession {
    client: ListServiceClient<Channel>,
    id: PrimitiveId,
    client_id: String,
}

impl ListSession {
    pub fn new(client: ListServiceClient<Channel>, id: PrimitiveId, client_id: String) -> Self {
        Self {
            client,
            id,
            client_id,
        }
    }
}

impl SessionHandler for ListSession {
    async fn create(&self, header: Header) -> Result<Header> {
        let request = CreateRequest {
            header: Some(header),
            id: Some(self.id.clone()),
            client_id: self.client_id.clone(),
        };
        let response = self.client.clone().create(request).await?.into_inner();
        created_header(response.header)
    }

    async fn keep_alive(&self, header: Header) -> Result<()> {
        let request = KeepAliveRequest {
            header: Some(header),
        };
        self.client.clone().keep_alive(request).await?;
        Ok(())
    }

    async fn close(&self, header: Header, delete: bool) -> Result<()> {
        let request = CloseRequest {
            header: Some(header),
            delete,
        };
        self.client.clone().close(request).await?;
        Ok(())
    }
}
