//! Explicit source-IP transport for DHCP replies (spec §9: "bind to a
//! named interface and set IP_PKTINFO (or equivalent) to choose the
//! source IP explicitly... give this a dedicated transport abstraction").
//!
//! A host with more than one address on the bound interface can't rely on
//! the kernel picking `config.server_ip` as a UDP reply's source address;
//! `sendmsg` with an `IP_PKTINFO` control message pins it explicitly. This
//! is Linux-only, same as `SO_BINDTODEVICE` in `server.rs`; other targets
//! fall back to a plain `send_to` and let the OS choose.

use std::io;
use std::net::{Ipv4Addr, SocketAddr};

use socket2::Socket;
use tokio::net::UdpSocket;

/// Enable `IP_PKTINFO` on a not-yet-bound socket so `send_from` can attach
/// a source-address control message to outbound datagrams.
#[cfg(target_os = "linux")]
pub fn enable_pktinfo(socket: &Socket) -> io::Result<()> {
    use std::os::unix::io::AsRawFd;

    let enable: libc::c_int = 1;
    let ret = unsafe {
        libc::setsockopt(
            socket.as_raw_fd(),
            libc::IPPROTO_IP,
            libc::IP_PKTINFO,
            &enable as *const libc::c_int as *const libc::c_void,
            std::mem::size_of::<libc::c_int>() as libc::socklen_t,
        )
    };
    if ret != 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

#[cfg(not(target_os = "linux"))]
pub fn enable_pktinfo(_socket: &Socket) -> io::Result<()> {
    Ok(())
}

/// Send `buf` to `dest` with the IPv4 source address pinned to `src_ip`
/// via `IP_PKTINFO` (Linux). Falls back to `UdpSocket::send_to` elsewhere,
/// where the OS picks the source address.
#[cfg(target_os = "linux")]
pub async fn send_from(socket: &UdpSocket, buf: &[u8], dest: SocketAddr, src_ip: Ipv4Addr) -> io::Result<usize> {
    use std::os::unix::io::AsRawFd;

    let SocketAddr::V4(dest_v4) = dest else {
        return Err(io::Error::new(io::ErrorKind::InvalidInput, "dhcp transport is IPv4-only"));
    };
    let fd = socket.as_raw_fd();

    loop {
        socket.writable().await?;
        match socket.try_io(tokio::io::Interest::WRITABLE, || unsafe {
            sendmsg_with_source(fd, buf, dest_v4, src_ip)
        }) {
            Ok(n) => return Ok(n),
            Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => continue,
            Err(e) => return Err(e),
        }
    }
}

#[cfg(not(target_os = "linux"))]
pub async fn send_from(socket: &UdpSocket, buf: &[u8], dest: SocketAddr, _src_ip: Ipv4Addr) -> io::Result<usize> {
    socket.send_to(buf, dest).await
}

#[cfg(target_os = "linux")]
unsafe fn sendmsg_with_source(
    fd: std::os::unix::io::RawFd,
    buf: &[u8],
    dest: std::net::SocketAddrV4,
    src_ip: Ipv4Addr,
) -> io::Result<usize> {
    let mut dest_addr: libc::sockaddr_in = std::mem::zeroed();
    dest_addr.sin_family = libc::AF_INET as libc::sa_family_t;
    dest_addr.sin_port = dest.port().to_be();
    dest_addr.sin_addr = libc::in_addr { s_addr: u32::from(*dest.ip()).to_be() };

    let mut pktinfo: libc::in_pktinfo = std::mem::zeroed();
    pktinfo.ipi_spec_dst = libc::in_addr { s_addr: u32::from(src_ip).to_be() };

    let pktinfo_len = std::mem::size_of::<libc::in_pktinfo>() as libc::c_uint;
    let mut cmsg_buf = vec![0u8; libc::CMSG_SPACE(pktinfo_len) as usize];

    let mut iov = libc::iovec {
        iov_base: buf.as_ptr() as *mut libc::c_void,
        iov_len: buf.len(),
    };

    let mut msg: libc::msghdr = std::mem::zeroed();
    msg.msg_name = &mut dest_addr as *mut _ as *mut libc::c_void;
    msg.msg_namelen = std::mem::size_of::<libc::sockaddr_in>() as libc::socklen_t;
    msg.msg_iov = &mut iov;
    msg.msg_iovlen = 1;
    msg.msg_control = cmsg_buf.as_mut_ptr() as *mut libc::c_void;
    msg.msg_controllen = cmsg_buf.len() as _;

    let cmsg = libc::CMSG_FIRSTHDR(&msg);
    (*cmsg).cmsg_level = libc::IPPROTO_IP;
    (*cmsg).cmsg_type = libc::IP_PKTINFO;
    (*cmsg).cmsg_len = libc::CMSG_LEN(pktinfo_len) as _;
    std::ptr::write(libc::CMSG_DATA(cmsg) as *mut libc::in_pktinfo, pktinfo);

    let ret = libc::sendmsg(fd, &msg, 0);
    if ret < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(ret as usize)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn send_from_delivers_payload_to_destination() {
        let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let client = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let client_addr = client.local_addr().unwrap();

        send_from(&socket, b"hello", client_addr, Ipv4Addr::LOCALHOST).await.unwrap();

        let mut buf = [0u8; 16];
        let (len, _) = client.recv_from(&mut buf).await.unwrap();
        assert_eq!(&buf[..len], b"hello");
    }
}
