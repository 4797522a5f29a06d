//! Chain context for batched contract reads.
//!
//! The batching itself is done by an external [`Multicall`] implementation. [`ContextualMulticall`]
//! fills in the chain id and the latest known block so callers only describe the calls.
use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;
use quoter_common::{models::ChainId, Address};

use crate::blocks::BlockTracker;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Call {
    pub target: Address,
    pub calldata: Vec<u8>,
}

impl Call {
    pub fn new(target: Address, calldata: Vec<u8>) -> Self {
        Self { target, calldata }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallState {
    /// No result yet, e.g. the latest block is unknown or the batch has not been executed.
    Pending,
    Ready { block_number: u64, data: Vec<u8> },
}

#[cfg_attr(test, automock)]
#[async_trait]
pub trait Multicall: Send + Sync {
    /// Returns one state per call, in call order.
    async fn read_contracts(
        &self,
        chain_id: ChainId,
        latest_block: Option<u64>,
        calls: &[Call],
    ) -> Vec<CallState>;
}

pub struct ContextualMulticall<M> {
    inner: M,
    blocks: BlockTracker,
}

impl<M: Multicall> ContextualMulticall<M> {
    pub fn new(inner: M, blocks: BlockTracker) -> Self {
        Self { inner, blocks }
    }

    pub async fn read_contracts(&self, calls: &[Call]) -> Vec<CallState> {
        let mut states = self
            .inner
            .read_contracts(self.blocks.chain_id(), self.blocks.latest(), calls)
            .await;
        states.resize(calls.len(), CallState::Pending);
        states
    }

    pub async fn single_call_result(&self, target: Address, calldata: Vec<u8>) -> CallState {
        self.read_contracts(&[Call::new(target, calldata)])
            .await
            .pop()
            .unwrap_or(CallState::Pending)
    }

    /// The same call against many contracts.
    pub async fn multiple_contract_single_data(
        &self,
        targets: &[Address],
        calldata: &[u8],
    ) -> Vec<CallState> {
        let calls: Vec<_> = targets
            .iter()
            .map(|target| Call::new(*target, calldata.to_vec()))
            .collect();
        self.read_contracts(&calls).await
    }

    /// Many calls against one contract.
    pub async fn single_contract_multiple_data(
        &self,
        target: Address,
        calldatas: &[Vec<u8>],
    ) -> Vec<CallState> {
        let calls: Vec<_> = calldatas
            .iter()
            .map(|calldata| Call::new(target, calldata.clone()))
            .collect();
        self.read_contracts(&calls).await
    }
}

#[cfg(test)]
mod test {
    use pretty_assertions::assert_eq;

    use super::*;

    #[tokio::test]
    async fn test_injects_chain_and_latest_block() {
        let blocks = BlockTracker::new(10);
        blocks.update(77);
        let mut inner = MockMulticall::new();
        inner
            .expect_read_contracts()
            .withf(|chain_id, latest, calls| {
                *chain_id == 10 && *latest == Some(77) && calls.len() == 2
            })
            .times(1)
            .returning(|_, latest, calls| {
                calls
                    .iter()
                    .map(|c| CallState::Ready {
                        block_number: latest.unwrap_or_default(),
                        data: c.calldata.clone(),
                    })
                    .collect()
            });
        let multicall = ContextualMulticall::new(inner, blocks);

        let states = multicall
            .multiple_contract_single_data(
                &[Address::repeat_byte(1), Address::repeat_byte(2)],
                &[0x70, 0xa0],
            )
            .await;

        assert_eq!(
            states,
            vec![CallState::Ready { block_number: 77, data: vec![0x70, 0xa0] }; 2]
        );
    }

    #[tokio::test]
    async fn test_missing_states_are_pending() {
        let mut inner = MockMulticall::new();
        inner
            .expect_read_contracts()
            .returning(|_, _, _| vec![]);
        let multicall = ContextualMulticall::new(inner, BlockTracker::new(1));

        let state = multicall
            .single_call_result(Address::repeat_byte(1), vec![1])
            .await;
        let states = multicall
            .single_contract_multiple_data(Address::repeat_byte(1), &[vec![1], vec![2]])
            .await;

        assert_eq!(state, CallState::Pending);
        assert_eq!(states, vec![CallState::Pending, CallState::Pending]);
    }
}
