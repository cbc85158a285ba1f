//! Byte encoding for the types in [`super`], used by [`crate::transport`]
//! to put RPC payloads on the wire. Same house style as
//! [`crate::tree::snapshot`]: length-prefixed, big-endian, hand-written,
//! tag byte for each tagged union.

use std::io::{self, Read, Write};

use crate::codec::*;
use crate::tree::{Condition, TreeStats};

use super::{
    Configuration, ExactlyOnceRpcInfo, ServerControlRequest, ServerControlResponse,
    ServerDescriptor, ServerStats, SetConfigurationResult, TreeCommand, TreeCommandRequest,
    TreeQuery, TreeQueryRequest, TreeResponse, WireStatus,
};

fn write_condition(dest: &mut dyn Write, c: &Condition) -> io::Result<()> {
    write_string(dest, &c.path)?;
    write_bytes(dest, &c.contents)
}

fn read_condition(src: &mut dyn Read) -> io::Result<Condition> {
    let path = read_string(src)?;
    let contents = read_bytes(src)?;
    Ok(Condition { path, contents })
}

pub fn write_exactly_once_info(dest: &mut dyn Write, info: &ExactlyOnceRpcInfo) -> io::Result<()> {
    write_u64(dest, info.client_id)?;
    write_u64(dest, info.rpc_number)?;
    write_u64(dest, info.first_outstanding)
}

pub fn read_exactly_once_info(src: &mut dyn Read) -> io::Result<ExactlyOnceRpcInfo> {
    Ok(ExactlyOnceRpcInfo {
        client_id: read_u64(src)?,
        rpc_number: read_u64(src)?,
        first_outstanding: read_u64(src)?,
    })
}

pub fn write_tree_command_request(
    dest: &mut dyn Write,
    req: &TreeCommandRequest,
) -> io::Result<()> {
    match &req.command {
        TreeCommand::MakeDirectory { path } => {
            write_u8(dest, 0)?;
            write_string(dest, path)?;
        }
        TreeCommand::RemoveDirectory { path } => {
            write_u8(dest, 1)?;
            write_string(dest, path)?;
        }
        TreeCommand::Write { path, contents } => {
            write_u8(dest, 2)?;
            write_string(dest, path)?;
            write_bytes(dest, contents)?;
        }
        TreeCommand::RemoveFile { path } => {
            write_u8(dest, 3)?;
            write_string(dest, path)?;
        }
    }
    write_condition(dest, &req.condition)
}

pub fn read_tree_command_request(src: &mut dyn Read) -> io::Result<TreeCommandRequest> {
    let command = match read_u8(src)? {
        0 => TreeCommand::MakeDirectory { path: read_string(src)? },
        1 => TreeCommand::RemoveDirectory { path: read_string(src)? },
        2 => {
            let path = read_string(src)?;
            let contents = read_bytes(src)?;
            TreeCommand::Write { path, contents }
        }
        3 => TreeCommand::RemoveFile { path: read_string(src)? },
        tag => return Err(invalid_tag("TreeCommand", tag)),
    };
    let condition = read_condition(src)?;
    Ok(TreeCommandRequest { command, condition })
}

pub fn write_tree_query_request(dest: &mut dyn Write, req: &TreeQueryRequest) -> io::Result<()> {
    match &req.query {
        TreeQuery::ListDirectory { path } => {
            write_u8(dest, 0)?;
            write_string(dest, path)
        }
        TreeQuery::Read { path } => {
            write_u8(dest, 1)?;
            write_string(dest, path)
        }
    }
}

pub fn read_tree_query_request(src: &mut dyn Read) -> io::Result<TreeQueryRequest> {
    let query = match read_u8(src)? {
        0 => TreeQuery::ListDirectory { path: read_string(src)? },
        1 => TreeQuery::Read { path: read_string(src)? },
        tag => return Err(invalid_tag("TreeQuery", tag)),
    };
    Ok(TreeQueryRequest { query })
}

fn status_tag(s: WireStatus) -> u8 {
    match s {
        WireStatus::Ok => 0,
        WireStatus::InvalidArgument => 1,
        WireStatus::LookupError => 2,
        WireStatus::TypeError => 3,
        WireStatus::ConditionNotMet => 4,
        WireStatus::Timeout => 5,
        WireStatus::SessionExpired => 6,
    }
}

fn status_from_tag(tag: u8) -> WireStatus {
    match tag {
        0 => WireStatus::Ok,
        1 => WireStatus::InvalidArgument,
        2 => WireStatus::LookupError,
        3 => WireStatus::TypeError,
        4 => WireStatus::ConditionNotMet,
        5 => WireStatus::Timeout,
        // Unknown codes default to InvalidArgument (spec.md §9: implementers
        // should avoid misclassifying an unrecognized status).
        _ => WireStatus::InvalidArgument,
    }
}

pub fn write_tree_response(dest: &mut dyn Write, resp: &TreeResponse) -> io::Result<()> {
    write_u8(dest, status_tag(resp.status.unwrap_or(WireStatus::Ok)))?;
    write_string(dest, &resp.error)?;
    match &resp.contents {
        Some(c) => {
            write_bool(dest, true)?;
            write_bytes(dest, c)?;
        }
        None => write_bool(dest, false)?,
    }
    match &resp.children {
        Some(children) => {
            write_bool(dest, true)?;
            write_u32(dest, children.len() as u32)?;
            for c in children {
                write_string(dest, c)?;
            }
        }
        None => write_bool(dest, false)?,
    }
    Ok(())
}

pub fn read_tree_response(src: &mut dyn Read) -> io::Result<TreeResponse> {
    let status = status_from_tag(read_u8(src)?);
    let error = read_string(src)?;
    let contents = if read_bool(src)? { Some(read_bytes(src)?) } else { None };
    let children = if read_bool(src)? {
        let n = read_u32(src)?;
        let mut v = Vec::with_capacity(n as usize);
        for _ in 0..n {
            v.push(read_string(src)?);
        }
        Some(v)
    } else {
        None
    };
    Ok(TreeResponse {
        status_is_ok: matches!(status, WireStatus::Ok),
        status: Some(status),
        error,
        contents,
        children,
    })
}

pub fn write_server_descriptor(dest: &mut dyn Write, s: &ServerDescriptor) -> io::Result<()> {
    write_u64(dest, s.server_id)?;
    write_string(dest, &s.addresses)
}

pub fn read_server_descriptor(src: &mut dyn Read) -> io::Result<ServerDescriptor> {
    Ok(ServerDescriptor { server_id: read_u64(src)?, addresses: read_string(src)? })
}

pub fn write_configuration(dest: &mut dyn Write, c: &Configuration) -> io::Result<()> {
    write_u64(dest, c.id)?;
    write_u32(dest, c.servers.len() as u32)?;
    for s in &c.servers {
        write_server_descriptor(dest, s)?;
    }
    Ok(())
}

pub fn read_configuration(src: &mut dyn Read) -> io::Result<Configuration> {
    let id = read_u64(src)?;
    let n = read_u32(src)?;
    let mut servers = Vec::with_capacity(n as usize);
    for _ in 0..n {
        servers.push(read_server_descriptor(src)?);
    }
    Ok(Configuration { id, servers })
}

pub fn write_set_configuration_result(
    dest: &mut dyn Write,
    r: &SetConfigurationResult,
) -> io::Result<()> {
    match r {
        SetConfigurationResult::Ok => write_u8(dest, 0),
        SetConfigurationResult::ConfigurationChanged => write_u8(dest, 1),
        SetConfigurationResult::Bad(servers) => {
            write_u8(dest, 2)?;
            write_u32(dest, servers.len() as u32)?;
            for s in servers {
                write_server_descriptor(dest, s)?;
            }
            Ok(())
        }
    }
}

pub fn read_set_configuration_result(src: &mut dyn Read) -> io::Result<SetConfigurationResult> {
    match read_u8(src)? {
        0 => Ok(SetConfigurationResult::Ok),
        1 => Ok(SetConfigurationResult::ConfigurationChanged),
        2 => {
            let n = read_u32(src)?;
            let mut servers = Vec::with_capacity(n as usize);
            for _ in 0..n {
                servers.push(read_server_descriptor(src)?);
            }
            Ok(SetConfigurationResult::Bad(servers))
        }
        tag => Err(invalid_tag("SetConfigurationResult", tag)),
    }
}

pub fn write_server_control_request(
    dest: &mut dyn Write,
    r: &ServerControlRequest,
) -> io::Result<()> {
    write_u32(dest, r.op_code as u32)?;
    write_bytes(dest, &r.payload)
}

pub fn read_server_control_request(src: &mut dyn Read) -> io::Result<ServerControlRequest> {
    let op_code = read_u32(src)? as u16;
    let payload = read_bytes(src)?;
    Ok(ServerControlRequest { op_code, payload })
}

pub fn write_server_control_response(
    dest: &mut dyn Write,
    r: &ServerControlResponse,
) -> io::Result<()> {
    write_bytes(dest, &r.payload)
}

pub fn read_server_control_response(src: &mut dyn Read) -> io::Result<ServerControlResponse> {
    Ok(ServerControlResponse { payload: read_bytes(src)? })
}

pub fn write_tree_stats(dest: &mut dyn Write, s: &TreeStats) -> io::Result<()> {
    write_u64(dest, s.make_directory_attempted)?;
    write_u64(dest, s.make_directory_succeeded)?;
    write_u64(dest, s.list_directory_attempted)?;
    write_u64(dest, s.list_directory_succeeded)?;
    write_u64(dest, s.remove_directory_attempted)?;
    write_u64(dest, s.remove_directory_succeeded)?;
    write_u64(dest, s.write_attempted)?;
    write_u64(dest, s.write_succeeded)?;
    write_u64(dest, s.read_attempted)?;
    write_u64(dest, s.read_succeeded)?;
    write_u64(dest, s.remove_file_attempted)?;
    write_u64(dest, s.remove_file_succeeded)?;
    write_u64(dest, s.conditions_checked)?;
    write_u64(dest, s.conditions_failed)
}

pub fn read_tree_stats(src: &mut dyn Read) -> io::Result<TreeStats> {
    Ok(TreeStats {
        make_directory_attempted: read_u64(src)?,
        make_directory_succeeded: read_u64(src)?,
        list_directory_attempted: read_u64(src)?,
        list_directory_succeeded: read_u64(src)?,
        remove_directory_attempted: read_u64(src)?,
        remove_directory_succeeded: read_u64(src)?,
        write_attempted: read_u64(src)?,
        write_succeeded: read_u64(src)?,
        read_attempted: read_u64(src)?,
        read_succeeded: read_u64(src)?,
        remove_file_attempted: read_u64(src)?,
        remove_file_succeeded: read_u64(src)?,
        conditions_checked: read_u64(src)?,
        conditions_failed: read_u64(src)?,
    })
}

pub fn write_server_stats(dest: &mut dyn Write, s: &ServerStats) -> io::Result<()> {
    write_u64(dest, s.server_id)?;
    write_tree_stats(dest, &s.tree)
}

pub fn read_server_stats(src: &mut dyn Read) -> io::Result<ServerStats> {
    let server_id = read_u64(src)?;
    let tree = read_tree_stats(src)?;
    Ok(ServerStats { server_id, tree })
}

fn invalid_tag(what: &str, tag: u8) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, format!("unrecognized {what} tag {tag}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tree_command_request_round_trips() {
        let req = TreeCommandRequest {
            command: TreeCommand::Write { path: "/a".into(), contents: b"x".to_vec() },
            condition: Condition { path: "/c".into(), contents: b"v".to_vec() },
        };
        let mut buf = Vec::new();
        write_tree_command_request(&mut buf, &req).unwrap();
        let decoded = read_tree_command_request(&mut buf.as_slice()).unwrap();
        assert_eq!(req, decoded);
    }

    #[test]
    fn tree_response_round_trips() {
        let resp = TreeResponse::ok_with_children(vec!["a/".into(), "b".into()]);
        let mut buf = Vec::new();
        write_tree_response(&mut buf, &resp).unwrap();
        let decoded = read_tree_response(&mut buf.as_slice()).unwrap();
        assert_eq!(resp, decoded);
    }

    #[test]
    fn unknown_status_defaults_to_invalid_argument() {
        let mut buf = Vec::new();
        write_u8(&mut buf, 200).unwrap();
        write_string(&mut buf, "").unwrap();
        write_bool(&mut buf, false).unwrap();
        write_bool(&mut buf, false).unwrap();
        let decoded = read_tree_response(&mut buf.as_slice()).unwrap();
        assert_eq!(decoded.status, Some(WireStatus::InvalidArgument));
    }
}
