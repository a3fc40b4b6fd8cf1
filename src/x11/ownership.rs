//! Window ownership via the X-Resource extension

use anyhow::Result;
use x11rb::protocol::res::{ClientIdMask, ClientIdSpec, ClientIdValue, ConnectionExt as _};
use x11rb::protocol::xproto::Window;

use super::XDisplay;
use crate::process::Pid;

/// Pid of the client owning `window`, `None` when the server has no pid record
///
/// This is a snapshot: the owner may exit right after the reply.
pub fn owner_pid(display: &XDisplay, window: Window) -> Result<Option<Pid>> {
    if !display.has_res() {
        return Ok(None);
    }

    let spec = ClientIdSpec {
        client: window,
        mask: ClientIdMask::LOCAL_CLIENT_PID.into(),
    };
    let reply = display.conn().res_query_client_ids(&[spec])?.reply()?;
    Ok(pid_from_ids(&reply.ids))
}

/// First value of the first record carrying the local-client-pid mask
fn pid_from_ids(ids: &[ClientIdValue]) -> Option<Pid> {
    let pid_mask = u32::from(ClientIdMask::LOCAL_CLIENT_PID);
    ids.iter()
        .find(|id| u32::from(id.spec.mask) & pid_mask != 0)
        .and_then(|id| id.value.first().copied())
}
