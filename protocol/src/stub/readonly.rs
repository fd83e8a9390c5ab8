//! Query-path wrapper: reads pass through, writes fail.

use chrono::{DateTime, Utc};

use super::{ChaincodeStub, Response};
use crate::error::{LedgerError, LedgerResult};

pub struct ReadOnlyStub<'p> {
    inner: &'p mut dyn ChaincodeStub,
}

impl<'p> ReadOnlyStub<'p> {
    pub fn new(inner: &'p mut dyn ChaincodeStub) -> Self {
        Self { inner }
    }
}

impl ChaincodeStub for ReadOnlyStub<'_> {
    fn tx_id(&self) -> &str {
        self.inner.tx_id()
    }

    fn channel_id(&self) -> &str {
        self.inner.channel_id()
    }

    fn chaincode_name(&self) -> &str {
        self.inner.chaincode_name()
    }

    fn tx_timestamp(&self) -> DateTime<Utc> {
        self.inner.tx_timestamp()
    }

    fn creator(&self) -> &[u8] {
        self.inner.creator()
    }

    fn args(&self) -> &[Vec<u8>] {
        self.inner.args()
    }

    fn get_state(&self, key: &str) -> LedgerResult<Option<Vec<u8>>> {
        self.inner.get_state(key)
    }

    fn put_state(&mut self, _key: &str, _value: Vec<u8>) -> LedgerResult<()> {
        Err(LedgerError::ReadOnly)
    }

    fn del_state(&mut self, _key: &str) -> LedgerResult<()> {
        Err(LedgerError::ReadOnly)
    }

    fn range(&self, start: &str, end: &str) -> LedgerResult<Vec<(String, Vec<u8>)>> {
        self.inner.range(start, end)
    }

    fn set_event(&mut self, _name: &str, _payload: Vec<u8>) -> LedgerResult<()> {
        Err(LedgerError::ReadOnly)
    }

    // Cross-chaincode reads (ACL lookups) stay available to queries.
    fn invoke_chaincode(
        &mut self,
        chaincode: &str,
        args: &[Vec<u8>],
        channel: &str,
    ) -> LedgerResult<Response> {
        self.inner.invoke_chaincode(chaincode, args, channel)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stub::MemoryWorld;

    #[test]
    fn writes_are_refused() {
        let mut world = MemoryWorld::new("ch", "cc");
        world.seed("k", vec![1]);
        let mut stub = world.stub(Vec::new(), Vec::new());
        let mut ro = ReadOnlyStub::new(&mut stub);
        assert_eq!(ro.get_state("k").unwrap(), Some(vec![1]));
        assert!(matches!(ro.put_state("k", vec![2]), Err(LedgerError::ReadOnly)));
        assert!(matches!(ro.del_state("k"), Err(LedgerError::ReadOnly)));
        assert!(matches!(ro.set_event("e", vec![]), Err(LedgerError::ReadOnly)));
    }
}
