//! Networking implementation for local (in-process) execution.

use super::*;
use async_cell::sync::AsyncCell;
use dashmap::DashMap;
use std::sync::Arc;

/// A simple implementation of asynchronous networking for local execution.
///
/// This implementation is intended for simulating several parties inside one
/// process only. It simply stores all values in a concurrent map without any
/// actual networking.
#[derive(Default)]
pub struct LocalAsyncNetworking {
    store: DashMap<String, Arc<AsyncCell<RingTensor>>>,
}

impl LocalAsyncNetworking {
    fn cell(
        &self,
        rendezvous_key: &RendezvousKey,
        session_id: &SessionId,
    ) -> Arc<AsyncCell<RingTensor>> {
        let key = format!("{}/{}", session_id, rendezvous_key);
        self.store
            .entry(key)
            .or_insert_with(AsyncCell::shared)
            .value()
            .clone()
    }
}

#[async_trait]
impl AsyncNetworking for LocalAsyncNetworking {
    async fn send(
        &self,
        value: &RingTensor,
        receiver: &Role,
        rendezvous_key: &RendezvousKey,
        session_id: &SessionId,
    ) -> Result<()> {
        tracing::debug!(
            "Async sending to {}; rdv:'{}' sid:{}",
            receiver,
            rendezvous_key,
            session_id
        );
        self.cell(rendezvous_key, session_id).set(value.clone());
        Ok(())
    }

    async fn receive(
        &self,
        sender: &Role,
        rendezvous_key: &RendezvousKey,
        session_id: &SessionId,
    ) -> Result<RingTensor> {
        tracing::debug!(
            "Async receiving from {}; rdv:'{}', sid:{}",
            sender,
            rendezvous_key,
            session_id
        );
        let val = self.cell(rendezvous_key, session_id).get().await;
        Ok(val)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;
    use std::convert::TryFrom;
    use std::num::Wrapping;

    fn ring(values: &[u128]) -> RingTensor {
        ndarray::Array1::from(values.iter().map(|&v| Wrapping(v)).collect::<Vec<_>>())
            .into_shared()
    }

    #[tokio::test]
    async fn async_networking() {
        let net = Arc::new(LocalAsyncNetworking::default());
        let sid = SessionId::try_from("12345").unwrap();
        let other_sid = SessionId::try_from("67890").unwrap();

        let net1 = Arc::clone(&net);
        let sid1 = sid.clone();
        let task1 = tokio::spawn(async move {
            net1.receive(&Role::from("alice"), &RendezvousKey::from(1), &sid1)
                .await
        });

        let net2 = Arc::clone(&net);
        let sid2 = other_sid.clone();
        let task2 = tokio::spawn(async move {
            net2.receive(&Role::from("alice"), &RendezvousKey::from(1), &sid2)
                .await
        });

        let net3 = Arc::clone(&net);
        let task3 = tokio::spawn(async move {
            net3.send(&ring(&[1, 2]), &Role::from("bob"), &RendezvousKey::from(1), &sid)
                .await
        });

        let net4 = Arc::clone(&net);
        let task4 = tokio::spawn(async move {
            net4.send(
                &ring(&[3]),
                &Role::from("bob"),
                &RendezvousKey::from(1),
                &other_sid,
            )
            .await
        });

        let res = futures::future::try_join_all(vec![task3, task4]).await.unwrap();
        assert!(res.iter().all(|r| r.is_ok()));

        let received = futures::future::try_join_all(vec![task1, task2])
            .await
            .unwrap();
        let values: Vec<RingTensor> = received.into_iter().map(|r| r.unwrap()).collect();
        assert_eq!(values[0], array![Wrapping(1_u128), Wrapping(2)].into_shared());
        assert_eq!(values[1], array![Wrapping(3_u128)].into_shared());
    }
}
