//! `$dnsrewrite` payload parsing.
//!
//! Accepted forms:
//!   ``            — NOERROR with no data
//!   `NXDOMAIN`    — status only (also NOERROR, REFUSED)
//!   `1.2.3.4`     — shorthand: A/AAAA by address family
//!   `other.host`  — shorthand: CNAME
//!   `RCODE;RRTYPE;VALUE` — fully spelled out

use aegis_dns_domain::{CoreError, DnsRewrite, RecordType, RewriteRcode, RewriteValue};
use std::net::IpAddr;

pub fn parse_dnsrewrite(payload: &str) -> Result<DnsRewrite, CoreError> {
    let payload = payload.trim();

    if payload.is_empty() {
        return Ok(DnsRewrite::empty());
    }

    if !payload.contains(';') {
        if let Some(rcode) = parse_rcode(payload) {
            return Ok(DnsRewrite::status(rcode));
        }
        return Ok(DnsRewrite::answer(shorthand_value(payload)?));
    }

    let mut parts = payload.splitn(3, ';');
    let rcode_part = parts.next().unwrap_or_default().trim();
    let rtype_part = parts.next().unwrap_or_default().trim();
    let value_part = parts.next().unwrap_or_default().trim();

    let rcode = parse_rcode(rcode_part)
        .ok_or_else(|| CoreError::InvalidRule(format!("bad dnsrewrite rcode: {rcode_part}")))?;

    if rcode != RewriteRcode::NoError {
        if !rtype_part.is_empty() || !value_part.is_empty() {
            return Err(CoreError::InvalidRule(
                "status rewrites take no value".into(),
            ));
        }
        return Ok(DnsRewrite::status(rcode));
    }

    if rtype_part.is_empty() {
        return Ok(DnsRewrite::empty());
    }

    let rtype: RecordType = rtype_part.parse()?;
    let value = typed_value(rtype, value_part)?;
    Ok(DnsRewrite::answer(value))
}

fn parse_rcode(token: &str) -> Option<RewriteRcode> {
    match token.to_ascii_uppercase().as_str() {
        "NOERROR" => Some(RewriteRcode::NoError),
        "NXDOMAIN" => Some(RewriteRcode::NxDomain),
        "REFUSED" => Some(RewriteRcode::Refused),
        _ => None,
    }
}

fn shorthand_value(token: &str) -> Result<RewriteValue, CoreError> {
    if let Ok(ip) = token.parse::<IpAddr>() {
        return Ok(match ip {
            IpAddr::V4(v4) => RewriteValue::A(v4),
            IpAddr::V6(v6) => RewriteValue::Aaaa(v6),
        });
    }
    if token.contains('.') {
        return Ok(RewriteValue::Cname(token.to_string()));
    }
    Err(CoreError::InvalidRule(format!(
        "bad dnsrewrite shorthand: {token}"
    )))
}

fn typed_value(rtype: RecordType, value: &str) -> Result<RewriteValue, CoreError> {
    let bad = |what: &str| CoreError::InvalidRule(format!("bad dnsrewrite {rtype} value: {what}"));

    match rtype {
        RecordType::A => value
            .parse()
            .map(RewriteValue::A)
            .map_err(|_| bad(value)),
        RecordType::AAAA => value
            .parse()
            .map(RewriteValue::Aaaa)
            .map_err(|_| bad(value)),
        RecordType::CNAME => {
            if value.is_empty() {
                return Err(bad("empty target"));
            }
            Ok(RewriteValue::Cname(value.to_string()))
        }
        RecordType::MX => {
            let (pref, exchange) = value.split_once(' ').ok_or_else(|| bad(value))?;
            Ok(RewriteValue::Mx {
                preference: pref.parse().map_err(|_| bad(pref))?,
                exchange: exchange.trim().to_string(),
            })
        }
        RecordType::SRV => {
            let mut it = value.split_whitespace();
            let priority = it.next().ok_or_else(|| bad(value))?;
            let weight = it.next().ok_or_else(|| bad(value))?;
            let port = it.next().ok_or_else(|| bad(value))?;
            let target = it.next().ok_or_else(|| bad(value))?;
            if it.next().is_some() {
                return Err(bad(value));
            }
            Ok(RewriteValue::Srv {
                priority: priority.parse().map_err(|_| bad(priority))?,
                weight: weight.parse().map_err(|_| bad(weight))?,
                port: port.parse().map_err(|_| bad(port))?,
                target: target.to_string(),
            })
        }
        RecordType::TXT => Ok(RewriteValue::Txt(value.to_string())),
        RecordType::SVCB | RecordType::HTTPS => {
            svc_value(rtype == RecordType::HTTPS, value).ok_or_else(|| bad(value))
        }
        RecordType::PTR => {
            if value.is_empty() {
                return Err(bad("empty target"));
            }
            // Synthetic PTR targets always end in a trailing dot.
            let target = if value.ends_with('.') {
                value.to_string()
            } else {
                format!("{value}.")
            };
            Ok(RewriteValue::Ptr(target))
        }
        other => Err(CoreError::InvalidRule(format!(
            "dnsrewrite does not support {other}"
        ))),
    }
}

/// `1 . alpn=h2 ech=AAAA` → priority, target, ordered key=value params.
fn svc_value(https: bool, value: &str) -> Option<RewriteValue> {
    let mut it = value.split_whitespace();
    let priority: u16 = it.next()?.parse().ok()?;
    let target = it.next()?.to_string();

    let mut params = Vec::new();
    for token in it {
        let (key, val) = token.split_once('=')?;
        if key.is_empty() {
            return None;
        }
        params.push((key.to_ascii_lowercase(), val.to_string()));
    }

    Some(RewriteValue::SvcRecord {
        https,
        priority,
        target,
        params,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_is_noerror_without_data() {
        let rw = parse_dnsrewrite("").unwrap();
        assert_eq!(rw.rcode, RewriteRcode::NoError);
        assert!(rw.value.is_none());
    }

    #[test]
    fn status_forms() {
        assert_eq!(
            parse_dnsrewrite("NXDOMAIN").unwrap().rcode,
            RewriteRcode::NxDomain
        );
        assert_eq!(
            parse_dnsrewrite("REFUSED").unwrap().rcode,
            RewriteRcode::Refused
        );
        assert!(parse_dnsrewrite("NXDOMAIN;A;1.2.3.4").is_err());
    }

    #[test]
    fn shorthand_ip_and_cname() {
        assert!(matches!(
            parse_dnsrewrite("1.2.3.4").unwrap().value,
            Some(RewriteValue::A(_))
        ));
        assert!(matches!(
            parse_dnsrewrite("::1").unwrap().value,
            Some(RewriteValue::Aaaa(_))
        ));
        assert!(matches!(
            parse_dnsrewrite("other.example.org").unwrap().value,
            Some(RewriteValue::Cname(_))
        ));
    }

    #[test]
    fn https_with_ech() {
        let rw = parse_dnsrewrite("NOERROR;HTTPS;1 . alpn=h2 ech=AAAA").unwrap();
        match rw.value.unwrap() {
            RewriteValue::SvcRecord { https, priority, target, params } => {
                assert!(https);
                assert_eq!(priority, 1);
                assert_eq!(target, ".");
                assert_eq!(params[0], ("alpn".to_string(), "h2".to_string()));
                assert_eq!(params[1], ("ech".to_string(), "AAAA".to_string()));
            }
            other => panic!("unexpected value: {other:?}"),
        }
    }

    #[test]
    fn ptr_gains_trailing_dot() {
        let rw = parse_dnsrewrite("NOERROR;PTR;host.example.net").unwrap();
        assert_eq!(
            rw.value.unwrap(),
            RewriteValue::Ptr("host.example.net.".to_string())
        );
    }

    #[test]
    fn srv_four_fields() {
        let rw = parse_dnsrewrite("NOERROR;SRV;30 60 8080 svc.example.net").unwrap();
        assert!(matches!(
            rw.value.unwrap(),
            RewriteValue::Srv { priority: 30, weight: 60, port: 8080, .. }
        ));
        assert!(parse_dnsrewrite("NOERROR;SRV;30 60").is_err());
    }
}
