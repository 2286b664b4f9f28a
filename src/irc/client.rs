use futures::StreamExt;
use irc::client::prelude::*;
use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::instrument;
use uuid::Uuid;

use crate::bot::{Bot, MessageCtx};
use crate::util::env::IrcSettings;

/// Connects, joins the configured channels and answers commands until `shutdown` flips.
///
/// Every channel is its own scope and the sender's nickname is the subject. Each incoming
/// command runs on its own task so a slow store round trip never stalls the read loop.
#[instrument(skip(settings, bot, shutdown), fields(server = %settings.server, channels = ?settings.channels))]
pub async fn irc_runner(
    settings: &IrcSettings,
    bot: Bot,
    mut shutdown: watch::Receiver<bool>,
) -> IrcResult<JoinHandle<()>> {
    let mut connection = IrcConnection::init(settings).await?;
    connection.connect()?;

    let mut stream = connection.client.stream()?;

    let handle = tokio::spawn(async move {
        loop {
            tokio::select! {
                msg_res = stream.next() => match msg_res {
                    Some(Ok(msg)) => connection.dispatch(&msg, &bot),
                    Some(Err(e)) => {
                        tracing::error!(error = ?e, "IRC stream error");
                        break;
                    }
                    None => {
                        tracing::warn!("IRC stream closed");
                        break;
                    }
                },

                res = shutdown.changed() => {
                    if res.is_err() || *shutdown.borrow() {
                        if let Err(e) = connection.client.send_quit("bye") {
                            tracing::warn!(error = ?e, "failed to send QUIT");
                        }
                        break;
                    }
                }
            }
        }

        tracing::info!(id = %connection.id, "IRC runner stopped");
    });

    Ok(handle)
}

#[derive(Debug)]
pub struct IrcConnection {
    pub client: Client,
    pub id: Uuid,
}

impl IrcConnection {
    #[instrument(skip(settings))]
    pub async fn init(settings: &IrcSettings) -> IrcResult<Self> {
        let config = Config {
            use_tls: Some(true),
            nickname: Some(settings.nickname.clone()),
            password: settings.password.clone(),
            server: Some(settings.server.clone()),
            port: Some(settings.port),
            channels: settings.channels.clone(),
            ping_time: Some(300),
            ..Config::default()
        };

        let client = Client::from_config(config).await?;

        Ok(Self {
            client,
            id: Uuid::new_v4(),
        })
    }

    #[instrument(skip(self), fields(id = %self.id))]
    pub fn connect(&mut self) -> IrcResult<()> {
        self.client.identify()?;
        Ok(())
    }

    fn dispatch(&self, msg: &Message, bot: &Bot) {
        let Some((channel, ctx)) = message_ctx(msg) else {
            if let Command::NOTICE(target, notice) = &msg.command {
                tracing::warn!("{}: RECV NOTICE: {}", target, notice);
            }
            return;
        };

        let sender = self.client.sender();
        let bot = bot.clone();

        tokio::spawn(async move {
            if let Some(reply) = bot.handle(&ctx).await
                && let Err(e) = sender.send_privmsg(&channel, reply)
            {
                tracing::error!(error = ?e, channel = %channel, "failed to send reply");
            }
        });
    }
}

/// Channel and bot context for a channel `PRIVMSG`. Direct messages have no server and are
/// ignored.
pub fn message_ctx(msg: &Message) -> Option<(String, MessageCtx)> {
    let Command::PRIVMSG(target, content) = &msg.command else {
        return None;
    };

    if !target.starts_with('#') {
        return None;
    }

    let author = msg.source_nickname()?;
    Some((
        target.clone(),
        MessageCtx::new(target.as_str(), author, content),
    ))
}

pub type IrcResult<T> = core::result::Result<T, IrcClientErr>;

#[derive(Debug, Error)]
pub enum IrcClientErr {
    #[error(transparent)]
    ClientError(#[from] irc::error::Error),
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_channel_privmsg() {
        let msg: Message = ":ana!ana@host PRIVMSG #Quotes :--q cats are liquid"
            .parse()
            .unwrap();

        let (channel, ctx) = message_ctx(&msg).unwrap();
        assert_eq!(channel, "#Quotes");
        assert_eq!(ctx.server.as_str(), "quotes");
        assert_eq!(ctx.author.as_str(), "ana");
        assert_eq!(ctx.content, "--q cats are liquid");
    }

    #[test]
    fn test_direct_message_ignored() {
        let msg: Message = ":ana!ana@host PRIVMSG lunabot :--random".parse().unwrap();
        assert!(message_ctx(&msg).is_none());

        let ping: Message = "PING :irc.libera.chat".parse().unwrap();
        assert!(message_ctx(&ping).is_none());
    }
}
