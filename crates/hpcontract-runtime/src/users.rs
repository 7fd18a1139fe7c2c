use std::collections::BTreeMap;
use std::sync::Arc;

use bytes::Bytes;
use hpcontract_channel::{InputRange, Message, UserChannel, UserInputReader};

use crate::error::Result;

/// A user connected to this node for the current execution.
#[derive(Debug, Clone)]
pub struct User {
    public_key: String,
    inputs: Vec<InputRange>,
    channel: UserChannel,
}

impl User {
    pub fn new(public_key: impl Into<String>, inputs: Vec<InputRange>, channel: UserChannel) -> Self {
        Self {
            public_key: public_key.into(),
            inputs,
            channel,
        }
    }

    pub fn public_key(&self) -> &str {
        &self.public_key
    }

    /// Input ranges the user submitted this round, in the order given by the host.
    pub fn inputs(&self) -> &[InputRange] {
        &self.inputs
    }

    /// Send one output message to the user.
    pub async fn send(&self, message: impl Into<Message>) -> Result<()> {
        self.channel.send(&message.into()).await?;
        Ok(())
    }
}

/// Users connected for this execution, keyed by public key.
#[derive(Debug, Clone)]
pub struct UsersCollection {
    users: Arc<BTreeMap<String, User>>,
    reader: UserInputReader,
}

impl UsersCollection {
    pub fn new(reader: UserInputReader, users: impl IntoIterator<Item = User>) -> Self {
        let users = users
            .into_iter()
            .map(|user| (user.public_key.clone(), user))
            .collect();
        Self {
            users: Arc::new(users),
            reader,
        }
    }

    pub fn find(&self, public_key: &str) -> Option<&User> {
        self.users.get(public_key)
    }

    /// All users, ordered by public key.
    pub fn list(&self) -> impl Iterator<Item = &User> {
        self.users.values()
    }

    pub fn count(&self) -> usize {
        self.users.len()
    }

    /// Read one input out of the shared input file.
    pub async fn read(&self, range: InputRange) -> Result<Bytes> {
        Ok(self.reader.read(range).await?)
    }

    /// Read every input `user` submitted, in order.
    pub async fn read_inputs(&self, user: &User) -> Result<Vec<Bytes>> {
        let mut inputs = Vec::with_capacity(user.inputs.len());
        for range in &user.inputs {
            inputs.push(self.read(*range).await?);
        }
        Ok(inputs)
    }
}
