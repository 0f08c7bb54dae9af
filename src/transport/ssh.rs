use async_ssh2_tokio::client::{AuthMethod, Client};
use async_trait::async_trait;
use log::{debug, trace};
use russh::client::Msg;
use russh::{Channel, ChannelMsg};

use super::Transport;
use crate::config::{NETCONF_PORT, NETCONF_SUBSYSTEM};
use crate::error::NetconfError;
use crate::session::ConnectionSecurityOptions;

/// The `netconf` subsystem of an SSH connection.
pub struct SshTransport {
    client: Client,
    channel: Channel<Msg>,
    device_addr: String,
}

impl SshTransport {
    /// Connects with password authentication on the default NETCONF port.
    pub async fn connect_default(
        user: &str,
        addr: &str,
        password: &str,
        security_options: &ConnectionSecurityOptions,
    ) -> Result<Self, NetconfError> {
        Self::connect(user, addr, NETCONF_PORT, password, security_options).await
    }

    /// Connects with password authentication and opens the subsystem.
    pub async fn connect(
        user: &str,
        addr: &str,
        port: u16,
        password: &str,
        security_options: &ConnectionSecurityOptions,
    ) -> Result<Self, NetconfError> {
        security_options.validate()?;
        let device_addr = format!("{user}@{addr}:{port}");
        debug!(
            "{} connecting with {:?} profile, host key {:?}",
            device_addr, security_options.level, security_options.host_key
        );

        let client = Client::connect_with_config(
            (addr.to_string(), port),
            user,
            AuthMethod::with_password(password),
            security_options.server_check(),
            security_options.ssh_config(),
        )
        .await?;
        debug!("{} TCP connection successful", device_addr);

        let channel = client.get_channel().await?;
        channel.request_subsystem(true, NETCONF_SUBSYSTEM).await?;
        debug!("{} netconf subsystem request successful", device_addr);

        Ok(Self {
            client,
            channel,
            device_addr,
        })
    }

    /// Checks if the underlying SSH connection is still active.
    pub fn is_connected(&self) -> bool {
        !self.client.is_closed()
    }

    pub fn device_addr(&self) -> &str {
        &self.device_addr
    }
}

#[async_trait]
impl Transport for SshTransport {
    async fn write(&mut self, bytes: &[u8]) -> Result<(), NetconfError> {
        self.channel.data(bytes).await?;
        Ok(())
    }

    async fn read(&mut self) -> Result<Option<Vec<u8>>, NetconfError> {
        loop {
            match self.channel.wait().await {
                Some(ChannelMsg::Data { ref data }) => return Ok(Some(data.to_vec())),
                Some(ChannelMsg::ExtendedData { ref data, ext }) => {
                    trace!(
                        "{} stderr ({ext}): {:?}",
                        self.device_addr,
                        String::from_utf8_lossy(data)
                    );
                }
                Some(ChannelMsg::ExitStatus { exit_status }) => {
                    debug!(
                        "{} subsystem exited with status code: {}",
                        self.device_addr, exit_status
                    );
                    return Ok(None);
                }
                Some(ChannelMsg::Eof) | Some(ChannelMsg::Close) => {
                    debug!("{} subsystem sent EOF.", self.device_addr);
                    return Ok(None);
                }
                Some(_) => {}
                None => return Ok(None),
            }
        }
    }

    async fn close(&mut self) -> Result<(), NetconfError> {
        let _ = self.channel.eof().await;
        let _ = self.channel.close().await;
        debug!("{} SSH channel closed", self.device_addr);
        Ok(())
    }
}
