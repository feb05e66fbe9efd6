//! Terminal client for the relay's text protocol.
//!
//! Server lines are classified by prefix only, so a chat line that starts with
//! `SUBMIT_NAME` (for example a peer who picked that as a name) makes the
//! client answer with a name again, consuming the next stdin line.

use anyhow::{Context, Result};
use tokio::{
    io::{self, AsyncBufReadExt, AsyncWriteExt, BufReader, Lines, Stdin},
    net::{
        TcpStream,
        tcp::{OwnedReadHalf, OwnedWriteHalf},
    },
    select,
};
use tracing::{debug, info, warn};

use crate::{
    cli::ClientArgs,
    protocol::{NAME_ACCEPTED, SUBMIT_NAME, write_line},
};

/// How the client should react to one line from the relay.
#[derive(Debug, PartialEq, Eq)]
enum ServerLine<'a> {
    SubmitName,
    NameAccepted(&'a str),
    Display(&'a str),
}

impl<'a> ServerLine<'a> {
    fn parse(line: &'a str) -> Self {
        if line.starts_with(SUBMIT_NAME) {
            ServerLine::SubmitName
        } else if let Some(rest) = line.strip_prefix(NAME_ACCEPTED) {
            ServerLine::NameAccepted(rest.strip_prefix(' ').unwrap_or(rest))
        } else {
            ServerLine::Display(line)
        }
    }
}

pub async fn run(args: ClientArgs) -> Result<()> {
    let (mut reader, mut writer) = establish_connection(&args).await?;
    let mut stdin = BufReader::new(tokio::io::stdin()).lines();
    let mut name = args.name;

    run_client_loop(&mut reader, &mut writer, &mut stdin, &mut name).await?;
    if let Err(error) = writer.shutdown().await {
        debug!(?error, "relay connection already closed");
    }

    Ok(())
}

async fn establish_connection(
    args: &ClientArgs,
) -> Result<(Lines<BufReader<OwnedReadHalf>>, OwnedWriteHalf)> {
    let stream = TcpStream::connect(args.server)
        .await
        .with_context(|| format!("failed to connect to {}", args.server))?;

    info!("connected to {}", args.server);

    let (reader, writer) = stream.into_split();
    Ok((BufReader::new(reader).lines(), writer))
}

// `next_line` is cancel safe, so a line half-read when the other branch wins
// is picked up on the next iteration.
async fn run_client_loop(
    reader: &mut Lines<BufReader<OwnedReadHalf>>,
    writer: &mut OwnedWriteHalf,
    stdin: &mut Lines<BufReader<Stdin>>,
    name: &mut Option<String>,
) -> Result<()> {
    loop {
        select! {
            server_line = reader.next_line() => {
                if !handle_server_line(server_line, writer, stdin, name).await? {
                    break;
                }
            }
            input = stdin.next_line() => {
                if !handle_stdin_input(input, writer).await? {
                    break;
                }
            }
            interrupted = tokio::signal::ctrl_c() => {
                if let Err(error) = interrupted {
                    warn!(?error, "ctrl-c handler failed");
                }
                break;
            }
        }
    }
    Ok(())
}

async fn handle_server_line(
    line: io::Result<Option<String>>,
    writer: &mut OwnedWriteHalf,
    stdin: &mut Lines<BufReader<Stdin>>,
    name: &mut Option<String>,
) -> Result<bool> {
    let Some(line) = line? else {
        write_stdout("*** server closed the connection").await?;
        return Ok(false);
    };

    match ServerLine::parse(&line) {
        ServerLine::SubmitName => {
            let chosen = match name.take() {
                Some(chosen) => chosen,
                None => {
                    write_stdout("*** choose a username:").await?;
                    match stdin.next_line().await? {
                        Some(chosen) => chosen,
                        None => return Ok(false),
                    }
                }
            };
            write_line(writer, &chosen).await?;
        }
        ServerLine::NameAccepted(accepted) => {
            write_stdout(&format!("*** connected as {accepted}")).await?;
        }
        ServerLine::Display(text) => write_stdout(text).await?,
    }
    Ok(true)
}

async fn handle_stdin_input(
    input: io::Result<Option<String>>,
    writer: &mut OwnedWriteHalf,
) -> Result<bool> {
    let Some(text) = input? else {
        return Ok(false);
    };

    if text.is_empty() {
        return Ok(true);
    }

    if text.eq_ignore_ascii_case("/quit") {
        write_stdout("*** leaving chat").await?;
        return Ok(false);
    }

    write_line(writer, &text).await?;
    Ok(true)
}

async fn write_stdout(line: &str) -> io::Result<()> {
    write_line(&mut tokio::io::stdout(), line).await
}
