use lapin::Channel;
use tracing::debug;

/// A channel held by exactly one in-flight operation.
///
/// The channel is closed exactly once: by [`ChannelScope::release`], or, if
/// the scope is dropped first, by a close scheduled on the current runtime.
pub struct ChannelScope {
    channel: Channel,
    released: bool,
}

impl ChannelScope {
    pub(crate) fn new(channel: Channel) -> Self {
        Self {
            channel,
            released: false,
        }
    }

    pub fn channel(&self) -> &Channel {
        &self.channel
    }

    pub fn id(&self) -> u16 {
        self.channel.id()
    }

    /// Closes the channel. Close failures are logged and otherwise ignored:
    /// the operation that used the channel has already produced its result.
    ///
    /// The scope only counts as released once the close has completed. If
    /// this future is dropped part way, `Drop` still schedules the close.
    pub async fn release(mut self) {
        close_channel(&self.channel, "operation finished").await;
        self.released = true;
    }
}

async fn close_channel(channel: &Channel, reason: &str) {
    let id = channel.id();
    match channel.close(200, reason).await {
        Ok(()) => debug!(channel = id, reason, "Released channel"),
        Err(e) => debug!(channel = id, error = %e, "Channel close failed"),
    }
}

impl Drop for ChannelScope {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        let channel = self.channel.clone();
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    close_channel(&channel, "scope dropped").await;
                });
            }
            Err(_) => debug!(channel = channel.id(), "No runtime to release channel on drop"),
        }
    }
}

impl std::fmt::Debug for ChannelScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChannelScope")
            .field("channel", &self.channel.id())
            .field("released", &self.released)
            .finish()
    }
}
