//! Line-oriented parsing of the MPD wire protocol.
//!
//! Grounded in the teacher's `mpd/parser/{mod,error}.rs`: same `nom`
//! combinators, adapted to feed `crate::error::{MpdAck, MpdError}` instead
//! of a parser-local error enum.
use crate::error::{MpdAck, MpdError};
use nom::{
    bytes::complete::{tag, take_till, take_while},
    character::complete::*,
    AsChar, Err, IResult, InputTakeAtPosition,
};

/// Parses one `name: value` response line (without the trailing newline).
pub fn parse_line(i: &str) -> Result<(&str, &str), MpdError> {
    let i = i.strip_suffix('\n').unwrap_or(i);
    let i = i.strip_suffix('\r').unwrap_or(i);
    match parse_line_helper(i) {
        Ok((_, res)) => Ok(res),
        Err(e) => Err(MpdError::Protocol(describe_nom_err(i, e))),
    }
}

fn parse_line_helper(i: &str) -> IResult<&str, (&str, &str)> {
    let (i, name) = take_while(is_field_name_char)(i)?;
    let (i, _) = tag(": ")(i)?;
    let (i, value) = take_till(|c| c == '\n')(i)?;
    Ok((i, (name, value)))
}

fn is_field_name_char(c: char) -> bool {
    c.is_alpha() || c == '_' || c == '-'
}

/// Parses an `ACK [code@index] {command} message` line.
pub fn parse_ack_line(i: &str) -> Result<MpdAck, MpdError> {
    let i = i.strip_suffix('\n').unwrap_or(i);
    let i = i.strip_suffix('\r').unwrap_or(i);
    match parse_ack_line_helper(i) {
        Ok((_, (code, index, command, msg))) => Ok(MpdAck {
            code: code.parse().unwrap_or(0),
            command_list_index: index.parse().unwrap_or(0),
            current_command: command.to_owned(),
            message: msg.trim().to_owned(),
        }),
        Err(e) => Err(MpdError::Protocol(describe_nom_err(i, e))),
    }
}

fn parse_ack_line_helper(i: &str) -> IResult<&str, (&str, &str, &str, &str)> {
    let (i, _) = tag("ACK")(i)?;
    let (i, _) = space1(i)?;
    let (i, _) = char('[')(i)?;
    let (i, code) = digit1(i)?;
    let (i, _) = char('@')(i)?;
    let (i, index) = digit1(i)?;
    let (i, _) = char(']')(i)?;
    let (i, _) = char('{')(i)?;
    let (i, command) = command_token(i)?;
    let (i, _) = char('}')(i)?;
    let (i, msg) = take_till(|c| c == '\n')(i)?;
    Ok((i, (code, index, command, msg)))
}

fn command_token(input: &str) -> IResult<&str, &str> {
    input.split_at_position_complete(|c| !is_command_char(c))
}

fn is_command_char(c: char) -> bool {
    c.is_alpha() || c == '_'
}

fn describe_nom_err(i: &str, e: Err<nom::error::Error<&str>>) -> String {
    match e {
        Err::Incomplete(_) => format!("incomplete mpd line: {i:?}"),
        Err::Error(e) | Err::Failure(e) => {
            let pos = i.len().saturating_sub(e.input.len());
            format!("parse failed at byte {pos} of {i:?}")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_simple_line() {
        assert_eq!(parse_line("volume: 50\n").unwrap(), ("volume", "50"));
    }

    #[test]
    fn parses_ack_line() {
        let ack = parse_ack_line("ACK [2@0] {play} Bad song index\n").unwrap();
        assert_eq!(ack.code, 2);
        assert_eq!(ack.command_list_index, 0);
        assert_eq!(ack.current_command, "play");
        assert_eq!(ack.message, "Bad song index");
    }
}
