// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! SSRF protection for administrator-supplied task URLs.
//!
//! A URL is only accepted when it uses http(s), names a host, and every
//! address that host resolves to is publicly routable. The check runs when a
//! task is saved and again right before each execution; the execution-time
//! result carries the vetted socket addresses so the HTTP client can be pinned
//! to them.

use std::io;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, instrument};
use url::{Host, Url};

use crate::error::{Result, SchedulerCoreError};

/// Maximum accepted URL length in characters.
pub const MAX_TASK_URL_LEN: usize = 2048;

const CLOUD_METADATA_V4: Ipv4Addr = Ipv4Addr::new(169, 254, 169, 254);

const BLOCKED_HOSTNAMES: &[&str] = &["localhost", "metadata.google.internal", "metadata"];

/// Resolves a host name to socket addresses.
#[async_trait]
pub trait HostResolver: Send + Sync {
	async fn resolve(&self, host: &str, port: u16) -> io::Result<Vec<SocketAddr>>;
}

/// Resolver backed by the operating system (`getaddrinfo`).
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemResolver;

#[async_trait]
impl HostResolver for SystemResolver {
	async fn resolve(&self, host: &str, port: u16) -> io::Result<Vec<SocketAddr>> {
		Ok(tokio::net::lookup_host((host, port)).await?.collect())
	}
}

/// A URL that passed every safety check, with the addresses it was checked against.
#[derive(Debug, Clone)]
pub struct VettedUrl {
	pub url: Url,
	/// Host as written in the URL, without IPv6 brackets.
	pub host: String,
	pub addrs: Vec<SocketAddr>,
}

impl VettedUrl {
	/// True when the host is a name that went through DNS.
	pub fn is_domain(&self) -> bool {
		matches!(self.url.host(), Some(Host::Domain(_)))
	}
}

/// Validates task URLs, resolving host names through a [`HostResolver`].
#[derive(Clone)]
pub struct UrlGuard {
	resolver: Arc<dyn HostResolver>,
	allow_private_targets: bool,
}

impl UrlGuard {
	pub fn new(resolver: Arc<dyn HostResolver>) -> Self {
		Self {
			resolver,
			allow_private_targets: false,
		}
	}

	/// Guard using the system resolver.
	pub fn system() -> Self {
		Self::new(Arc::new(SystemResolver))
	}

	/// Permit loopback and private destinations.
	///
	/// Only for local development setups where the targets live on the same
	/// network as the server. Scheme and host checks still apply.
	pub fn allow_private_targets(mut self, allow: bool) -> Self {
		self.allow_private_targets = allow;
		self
	}

	pub fn allows_private_targets(&self) -> bool {
		self.allow_private_targets
	}

	/// Run the full check, including DNS resolution, and return the vetted addresses.
	#[instrument(skip(self), fields(allow_private = self.allow_private_targets))]
	pub async fn vet(&self, raw: &str) -> Result<VettedUrl> {
		let url = self.parse(raw)?;
		let port = url
			.port_or_known_default()
			.ok_or_else(|| SchedulerCoreError::InvalidUrl("URL has no port".to_string()))?;

		let (host, addrs) = match url.host() {
			Some(Host::Ipv4(ip)) => (ip.to_string(), vec![SocketAddr::new(IpAddr::V4(ip), port)]),
			Some(Host::Ipv6(ip)) => (ip.to_string(), vec![SocketAddr::new(IpAddr::V6(ip), port)]),
			Some(Host::Domain(domain)) => {
				let addrs = self.resolver.resolve(domain, port).await.map_err(|e| {
					SchedulerCoreError::ResolveFailed {
						host: domain.to_string(),
						message: e.to_string(),
					}
				})?;
				if addrs.is_empty() {
					return Err(SchedulerCoreError::ResolveFailed {
						host: domain.to_string(),
						message: "no addresses returned".to_string(),
					});
				}
				if !self.allow_private_targets {
					for addr in &addrs {
						check_ip(&addr.ip()).map_err(|reason| {
							SchedulerCoreError::UnsafeUrl(format!("{domain} resolves to {reason}"))
						})?;
					}
				}
				(domain.to_string(), addrs)
			}
			None => return Err(SchedulerCoreError::UnsafeUrl("URL has no host".to_string())),
		};

		debug!(host = %host, addr_count = addrs.len(), "task URL vetted");
		Ok(VettedUrl { url, host, addrs })
	}

	/// Checks that need no network access: syntax, scheme, host and literal addresses.
	pub fn parse(&self, raw: &str) -> Result<Url> {
		let url = parse_task_url(raw)?;
		if !self.allow_private_targets {
			check_literal_host(&url)?;
		}
		Ok(url)
	}
}

impl Default for UrlGuard {
	fn default() -> Self {
		Self::system()
	}
}

impl std::fmt::Debug for UrlGuard {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("UrlGuard")
			.field("allow_private_targets", &self.allow_private_targets)
			.finish_non_exhaustive()
	}
}

/// Validate a task URL using the system resolver.
pub async fn validate_task_url(raw: &str) -> Result<()> {
	UrlGuard::system().vet(raw).await.map(|_| ())
}

/// Synchronous subset of [`validate_task_url`]: everything except DNS resolution.
pub fn check_task_url_syntax(raw: &str) -> Result<Url> {
	let url = parse_task_url(raw)?;
	check_literal_host(&url)?;
	Ok(url)
}

/// Length, syntax, scheme and host presence only.
///
/// Destination checks are left to a [`UrlGuard`], which knows whether private
/// targets are allowed.
pub fn check_task_url_format(raw: &str) -> Result<Url> {
	parse_task_url(raw)
}

fn parse_task_url(raw: &str) -> Result<Url> {
	let raw = raw.trim();
	if raw.is_empty() {
		return Err(SchedulerCoreError::InvalidUrl("URL is required".to_string()));
	}
	let len = raw.chars().count();
	if len > MAX_TASK_URL_LEN {
		return Err(SchedulerCoreError::UrlTooLong {
			len,
			max: MAX_TASK_URL_LEN,
		});
	}

	let url = Url::parse(raw).map_err(|e| SchedulerCoreError::InvalidUrl(e.to_string()))?;

	match url.scheme() {
		"http" | "https" => {}
		other => {
			return Err(SchedulerCoreError::UnsafeUrl(format!(
				"scheme '{other}' is not allowed, use http or https"
			)))
		}
	}

	match url.host_str() {
		Some(host) if !host.is_empty() => Ok(url),
		_ => Err(SchedulerCoreError::UnsafeUrl("URL has no host".to_string())),
	}
}

fn check_literal_host(url: &Url) -> Result<()> {
	match url.host() {
		Some(Host::Ipv4(ip)) => check_ip(&IpAddr::V4(ip)).map_err(SchedulerCoreError::UnsafeUrl),
		Some(Host::Ipv6(ip)) => check_ip(&IpAddr::V6(ip)).map_err(SchedulerCoreError::UnsafeUrl),
		Some(Host::Domain(domain)) => {
			let domain = domain.trim_end_matches('.').to_ascii_lowercase();
			if BLOCKED_HOSTNAMES.contains(&domain.as_str()) || domain.ends_with(".localhost") {
				return Err(SchedulerCoreError::UnsafeUrl(format!(
					"host '{domain}' points at internal infrastructure"
				)));
			}
			Ok(())
		}
		None => Err(SchedulerCoreError::UnsafeUrl("URL has no host".to_string())),
	}
}

/// Returns a human readable reason when `ip` must not be contacted.
fn check_ip(ip: &IpAddr) -> std::result::Result<(), String> {
	if let IpAddr::V4(v4) = ip {
		if *v4 == CLOUD_METADATA_V4 {
			return Err(format!("{ip} (cloud metadata service)"));
		}
	}
	if is_private_or_reserved(ip) {
		return Err(format!("{ip} (loopback, private or reserved address)"));
	}
	Ok(())
}

/// True for any address the scheduler must never call.
pub fn is_private_or_reserved(ip: &IpAddr) -> bool {
	match ip {
		IpAddr::V4(ipv4) => is_private_or_reserved_v4(ipv4),
		IpAddr::V6(ipv6) => is_private_or_reserved_v6(ipv6),
	}
}

fn is_private_or_reserved_v4(ipv4: &Ipv4Addr) -> bool {
	let octets = ipv4.octets();
	ipv4.is_loopback()                                 // 127.0.0.0/8
		|| ipv4.is_private()                           // 10/8, 172.16/12, 192.168/16
		|| ipv4.is_link_local()                        // 169.254.0.0/16
		|| ipv4.is_multicast()                         // 224.0.0.0/4
		|| ipv4.is_documentation()                     // 192.0.2/24, 198.51.100/24, 203.0.113/24
		|| octets[0] == 0                              // 0.0.0.0/8
		|| octets[0] >= 240                            // 240.0.0.0/4 reserved, broadcast
		|| (octets[0] == 100 && octets[1] & 0xc0 == 64) // 100.64.0.0/10 shared address space
		|| (octets[0] == 192 && octets[1] == 0 && octets[2] == 0) // 192.0.0.0/24 protocol assignments
		|| (octets[0] == 198 && octets[1] & 0xfe == 18) // 198.18.0.0/15 benchmarking
}

fn is_private_or_reserved_v6(ipv6: &Ipv6Addr) -> bool {
	if let Some(embedded) = embedded_ipv4(ipv6) {
		return is_private_or_reserved_v4(&embedded);
	}
	let segments = ipv6.segments();
	ipv6.is_loopback()                                 // ::1
		|| ipv6.is_unspecified()                       // ::
		|| ipv6.is_multicast()                         // ff00::/8
		|| segments[0] & 0xffc0 == 0xfe80              // link-local fe80::/10
		|| segments[0] & 0xffc0 == 0xfec0              // site-local fec0::/10
		|| segments[0] & 0xfe00 == 0xfc00              // unique local fc00::/7
		|| (segments[0] == 0x2001 && segments[1] == 0x0db8) // documentation 2001:db8::/32
		|| (segments[0] == 0x0064 && segments[1] == 0xff9b && segments[2] == 0x0001) // local NAT64 64:ff9b:1::/48
}

/// The IPv4 address carried by mapped, compatible, NAT64 and 6to4 forms.
fn embedded_ipv4(ipv6: &Ipv6Addr) -> Option<Ipv4Addr> {
	if let Some(mapped) = ipv6.to_ipv4_mapped() {
		return Some(mapped);
	}
	let s = ipv6.segments();
	let tail = |hi: u16, lo: u16| Ipv4Addr::new((hi >> 8) as u8, hi as u8, (lo >> 8) as u8, lo as u8);
	match s {
		// ::a.b.c.d, including :: and ::1
		[0, 0, 0, 0, 0, 0, hi, lo] => Some(tail(hi, lo)),
		// 64:ff9b::/96
		[0x0064, 0xff9b, 0, 0, 0, 0, hi, lo] => Some(tail(hi, lo)),
		// 2002::/16
		[0x2002, hi, lo, ..] => Some(tail(hi, lo)),
		_ => None,
	}
}
