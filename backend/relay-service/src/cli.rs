use crate::error::AppError;

pub const USAGE: &str = "\
usage:
  relay-service <port>                 host a relay on <port>
  relay-service -c, --create <port>    same as above
  relay-service -j, --join <addr>      connect to a relay (host:port or just port)";

/// What the process was asked to do
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mode {
    Create { port: u16 },
    Join { addr: String },
}

fn parse_port(raw: &str) -> Result<u16, AppError> {
    raw.parse::<u16>()
        .map_err(|_| AppError::Config(format!("invalid port: {raw:?}")))
}

fn join_addr(raw: &str) -> Result<String, AppError> {
    if raw.contains(':') {
        Ok(raw.to_string())
    } else {
        parse_port(raw).map(|port| format!("127.0.0.1:{port}"))
    }
}

/// Parse arguments (without the program name).
///
/// `Ok(None)` means no arguments were given and the caller should print usage.
pub fn parse_args<I>(args: I) -> Result<Option<Mode>, AppError>
where
    I: IntoIterator<Item = String>,
{
    let mut args = args.into_iter();
    let Some(first) = args.next() else {
        return Ok(None);
    };

    let mode = match first.as_str() {
        "-c" | "--create" => {
            let value = args
                .next()
                .ok_or_else(|| AppError::Config(format!("{first} needs a port")))?;
            Mode::Create {
                port: parse_port(&value)?,
            }
        }
        "-j" | "--join" => {
            let value = args
                .next()
                .ok_or_else(|| AppError::Config(format!("{first} needs an address")))?;
            Mode::Join {
                addr: join_addr(&value)?,
            }
        }
        flag if flag.starts_with('-') => {
            return Err(AppError::Config(format!("unknown option: {flag}")));
        }
        port => Mode::Create {
            port: parse_port(port)?,
        },
    };

    if let Some(extra) = args.next() {
        return Err(AppError::Config(format!("unexpected argument: {extra}")));
    }
    Ok(Some(mode))
}
