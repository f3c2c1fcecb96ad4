//! Line-oriented terminal chat.
//!
//! Each input line is either a slash command or a message for the tutor.
//! Reading and writing go through generic async streams so the loop can run
//! against stdin/stdout or in-memory buffers.

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};

use crate::session::{ChatCoordinator, ChatRole, SendOutcome};

const HELP: &str = "Commands: /clear  /retry  /history  /help  /quit";

#[derive(Debug, PartialEq, Eq)]
enum Input<'a> {
    Quit,
    Clear,
    Retry,
    History,
    Help,
    Unknown(&'a str),
    Message(&'a str),
}

impl<'a> Input<'a> {
    fn parse(line: &'a str) -> Self {
        let trimmed = line.trim();
        match trimmed {
            "/quit" | "/exit" => Self::Quit,
            "/clear" => Self::Clear,
            "/retry" => Self::Retry,
            "/history" => Self::History,
            "/help" => Self::Help,
            cmd if cmd.starts_with('/') => Self::Unknown(cmd),
            _ => Self::Message(line),
        }
    }
}

/// Run the chat loop until `/quit` or end of input.
pub async fn run<R, W>(chat: &ChatCoordinator, input: R, mut output: W) -> std::io::Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let restored = chat.restore().await;
    if restored.is_empty() {
        say(&mut output, "Ask a study question.").await?;
    } else {
        say(
            &mut output,
            &format!("Restored {} messages from your last session.", restored.len()),
        )
        .await?;
    }
    say(&mut output, HELP).await?;

    let mut lines = input.lines();
    loop {
        output.write_all(b"> ").await?;
        output.flush().await?;

        let Some(line) = lines.next_line().await? else {
            break;
        };

        match Input::parse(&line) {
            Input::Quit => break,
            Input::Help => say(&mut output, HELP).await?,
            Input::Unknown(cmd) => {
                say(&mut output, &format!("Unknown command {cmd}. {HELP}")).await?;
            }
            Input::History => {
                let log = chat.messages().await;
                if log.is_empty() {
                    say(&mut output, "(no messages)").await?;
                }
                for message in &log {
                    let who = match message.role {
                        ChatRole::User => "you",
                        ChatRole::Assistant => "tutor",
                    };
                    say(&mut output, &format!("{who}: {}", message.content)).await?;
                }
            }
            Input::Clear => {
                chat.clear().await;
                say(&mut output, "Conversation cleared.").await?;
                warn_if_unsaved(chat, &mut output).await?;
            }
            Input::Retry => {
                let outcome = chat.retry().await;
                if outcome == SendOutcome::Ignored {
                    say(&mut output, "Nothing to retry.").await?;
                } else {
                    report(&mut output, outcome).await?;
                    warn_if_unsaved(chat, &mut output).await?;
                }
            }
            Input::Message(text) => {
                let outcome = chat.send(text).await;
                report(&mut output, outcome).await?;
                warn_if_unsaved(chat, &mut output).await?;
            }
        }
    }

    output.flush().await
}

async fn report<W: AsyncWrite + Unpin>(
    output: &mut W,
    outcome: SendOutcome,
) -> std::io::Result<()> {
    match outcome {
        SendOutcome::Ignored => Ok(()),
        SendOutcome::Rejected => say(output, "Still waiting for the previous answer.").await,
        SendOutcome::Replied(reply) => say(output, &format!("tutor: {}", reply.content)).await,
        SendOutcome::Failed(error) => {
            say(
                output,
                &format!("error: {error} (your message was not kept; /retry to send it again)"),
            )
            .await
        }
        SendOutcome::Discarded => say(output, "(reply dropped after clear)").await,
    }
}

async fn warn_if_unsaved<W: AsyncWrite + Unpin>(
    chat: &ChatCoordinator,
    output: &mut W,
) -> std::io::Result<()> {
    if let Some(warning) = chat.storage_warning().await {
        say(output, &format!("warning: conversation not saved: {warning}")).await?;
    }
    Ok(())
}

async fn say<W: AsyncWrite + Unpin>(output: &mut W, text: &str) -> std::io::Result<()> {
    output.write_all(text.as_bytes()).await?;
    output.write_all(b"\n").await
}
