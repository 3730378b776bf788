//! Conversions between the domain model and the hickory wire types, plus the
//! message-surgery helpers the pipeline and cache share.

use aegis_dns_application::ports::{AnswerData, ResponseRecord};
use aegis_dns_domain::{
    CoreError, Question, RecordType as DomainType, RewriteRcode, RewriteValue,
};
use hickory_proto::op::{Edns, Message, MessageType, OpCode, Query, ResponseCode};
use hickory_proto::rr::rdata::opt::{ClientSubnet, EdnsCode, EdnsOption};
use hickory_proto::rr::rdata::svcb::{Alpn, EchConfigList, IpHint, SvcParamKey, SvcParamValue, SVCB};
use hickory_proto::rr::rdata::{A, AAAA, CNAME, HTTPS, MX, PTR, SRV, TXT};
use hickory_proto::rr::{Name, RData, Record, RecordType as WireType};
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

pub fn to_wire_type(rtype: DomainType) -> WireType {
    WireType::from(rtype.to_u16())
}

pub fn from_wire_type(rtype: WireType) -> DomainType {
    DomainType::from_u16(u16::from(rtype))
}

pub fn rcode_of(rcode: RewriteRcode) -> ResponseCode {
    match rcode {
        RewriteRcode::NoError => ResponseCode::NoError,
        RewriteRcode::NxDomain => ResponseCode::NXDomain,
        RewriteRcode::Refused => ResponseCode::Refused,
    }
}

/// Parse an inbound wire message and pull out its single question.
pub fn parse_request(bytes: &[u8]) -> Result<(Message, Question), CoreError> {
    let message =
        Message::from_vec(bytes).map_err(|e| CoreError::WireFormat(e.to_string()))?;

    let query = message
        .queries()
        .first()
        .ok_or_else(|| CoreError::WireFormat("message has no question".into()))?;

    let question = Question::new(query.name().to_ascii(), from_wire_type(query.query_type()))
        .with_class(u16::from(query.query_class()));

    Ok((message, question))
}

/// Build the response skeleton for a request: same id and question, QR set,
/// RD copied, RA set (the core always forwards).
pub fn response_for(request: &Message) -> Message {
    let mut response = Message::new();
    response
        .set_id(request.id())
        .set_message_type(MessageType::Response)
        .set_op_code(OpCode::Query)
        .set_recursion_desired(request.recursion_desired())
        .set_recursion_available(true);
    for query in request.queries() {
        response.add_query(query.clone());
    }
    response
}

pub fn servfail_for(request: &Message) -> Message {
    let mut response = response_for(request);
    response.set_response_code(ResponseCode::ServFail);
    response
}

pub fn refused_for(request: &Message) -> Message {
    let mut response = response_for(request);
    response.set_response_code(ResponseCode::Refused);
    response
}

/// FORMERR for a message we could not parse; only the id (if any) survives.
pub fn formerr_bare(id: u16) -> Message {
    let mut response = Message::new();
    response
        .set_id(id)
        .set_message_type(MessageType::Response)
        .set_op_code(OpCode::Query)
        .set_response_code(ResponseCode::FormErr);
    response
}

/// Build an outbound query for a question, used by background refreshes and
/// upstream probes.
pub fn build_query(question: &Question, dnssec_ok: bool) -> Result<Message, CoreError> {
    let name = fqdn(&question.name)?;
    let mut message = Message::new();
    message
        .set_id(fastrand::u16(..))
        .set_message_type(MessageType::Query)
        .set_op_code(OpCode::Query)
        .set_recursion_desired(true);
    message.add_query(Query::query(name, to_wire_type(question.qtype)));

    let mut edns = Edns::new();
    edns.set_max_payload(1232);
    edns.set_dnssec_ok(dnssec_ok);
    message.set_edns(edns);

    Ok(message)
}

/// Parse a domain string into an absolute `Name`.
pub fn fqdn(name: &str) -> Result<Name, CoreError> {
    let mut parsed =
        Name::from_ascii(name).map_err(|e| CoreError::WireFormat(e.to_string()))?;
    parsed.set_fqdn(true);
    Ok(parsed)
}

/// Build one synthetic record from a rewrite value. TTL is always ≥ 1.
pub fn rewrite_record(
    qname: &Name,
    value: &RewriteValue,
    ttl: u32,
) -> Result<Record, CoreError> {
    let ttl = ttl.max(1);
    let rdata = match value {
        RewriteValue::A(ip) => RData::A(A(*ip)),
        RewriteValue::Aaaa(ip) => RData::AAAA(AAAA(*ip)),
        RewriteValue::Cname(target) => RData::CNAME(CNAME(fqdn(target)?)),
        RewriteValue::Mx { preference, exchange } => {
            RData::MX(MX::new(*preference, fqdn(exchange)?))
        }
        RewriteValue::Srv { priority, weight, port, target } => {
            RData::SRV(SRV::new(*priority, *weight, *port, fqdn(target)?))
        }
        RewriteValue::Txt(text) => RData::TXT(TXT::new(vec![text.clone()])),
        RewriteValue::SvcRecord { https, priority, target, params } => {
            let svcb = SVCB::new(*priority, fqdn(target)?, svc_params(params)?);
            if *https {
                RData::HTTPS(HTTPS(svcb))
            } else {
                RData::SVCB(svcb)
            }
        }
        RewriteValue::Ptr(target) => RData::PTR(PTR(fqdn(target)?)),
    };
    Ok(Record::from_rdata(qname.clone(), ttl, rdata))
}

fn svc_params(
    params: &[(String, String)],
) -> Result<Vec<(SvcParamKey, SvcParamValue)>, CoreError> {
    use base64::Engine as _;

    let mut out = Vec::with_capacity(params.len());
    for (key, value) in params {
        let pair = match key.as_str() {
            "alpn" => (
                SvcParamKey::Alpn,
                SvcParamValue::Alpn(Alpn(value.split(',').map(str::to_string).collect())),
            ),
            "port" => {
                let port: u16 = value
                    .parse()
                    .map_err(|_| CoreError::InvalidRule(format!("bad svc port: {value}")))?;
                (SvcParamKey::Port, SvcParamValue::Port(port))
            }
            // `echconfig` is the deprecated alias; both carry base64 bytes.
            "ech" | "echconfig" => {
                let bytes = base64::engine::general_purpose::STANDARD
                    .decode(value)
                    .map_err(|_| CoreError::InvalidRule(format!("bad ech value: {value}")))?;
                (
                    SvcParamKey::EchConfigList,
                    SvcParamValue::EchConfigList(EchConfigList(bytes)),
                )
            }
            "ipv4hint" => {
                let mut hints = Vec::new();
                for part in value.split(',') {
                    let ip: Ipv4Addr = part
                        .parse()
                        .map_err(|_| CoreError::InvalidRule(format!("bad ipv4hint: {part}")))?;
                    hints.push(A(ip));
                }
                (SvcParamKey::Ipv4Hint, SvcParamValue::Ipv4Hint(IpHint(hints)))
            }
            "ipv6hint" => {
                let mut hints = Vec::new();
                for part in value.split(',') {
                    let ip: Ipv6Addr = part
                        .parse()
                        .map_err(|_| CoreError::InvalidRule(format!("bad ipv6hint: {part}")))?;
                    hints.push(AAAA(ip));
                }
                (SvcParamKey::Ipv6Hint, SvcParamValue::Ipv6Hint(IpHint(hints)))
            }
            other => {
                return Err(CoreError::InvalidRule(format!(
                    "unsupported svc param: {other}"
                )))
            }
        };
        out.push(pair);
    }
    Ok(out)
}

/// Project the answer section into the shape the post-upstream filter pass
/// consumes.
pub fn answer_records(message: &Message) -> Vec<ResponseRecord> {
    message
        .answers()
        .iter()
        .map(|record| {
            let data = match record.data() {
                RData::A(A(ip)) => AnswerData::Ip(IpAddr::V4(*ip)),
                RData::AAAA(AAAA(ip)) => AnswerData::Ip(IpAddr::V6(*ip)),
                RData::CNAME(CNAME(name)) => {
                    AnswerData::Name(trim_dot(&name.to_ascii().to_ascii_lowercase()))
                }
                RData::PTR(PTR(name)) => {
                    AnswerData::Name(trim_dot(&name.to_ascii().to_ascii_lowercase()))
                }
                _ => AnswerData::Other,
            };
            ResponseRecord {
                rtype: from_wire_type(record.record_type()),
                data,
            }
        })
        .collect()
}

fn trim_dot(name: &str) -> String {
    name.strip_suffix('.').unwrap_or(name).to_string()
}

/// Smallest TTL in the answer section.
pub fn min_answer_ttl(message: &Message) -> Option<u32> {
    message.answers().iter().map(Record::ttl).min()
}

/// SOA MINIMUM from the authority section, for negative caching.
pub fn soa_minimum(message: &Message) -> Option<u32> {
    message.additionals().iter().chain(message.name_servers()).find_map(|record| {
        match record.data() {
            RData::SOA(soa) => Some(soa.minimum().min(record.ttl())),
            _ => None,
        }
    })
}

/// True for NXDOMAIN and NODATA responses.
pub fn is_negative(message: &Message) -> bool {
    message.response_code() == ResponseCode::NXDomain
        || (message.response_code() == ResponseCode::NoError && message.answers().is_empty())
}

/// Overwrite every answer/authority TTL, used when serving stale entries.
pub fn clamp_ttls(message: &mut Message, ttl: u32) {
    for record in message.answers_mut() {
        record.set_ttl(ttl);
    }
    for record in message.name_servers_mut() {
        record.set_ttl(ttl);
    }
}

/// Reduce every TTL by `elapsed` seconds, flooring at 1. Cache reads use this
/// so a served entry never outlives its stored expiry.
pub fn age_ttls(message: &mut Message, elapsed: u32) {
    for record in message.answers_mut() {
        record.set_ttl(record.ttl().saturating_sub(elapsed).max(1));
    }
    for record in message.name_servers_mut() {
        record.set_ttl(record.ttl().saturating_sub(elapsed).max(1));
    }
}

/// EDNS client subnet carried by a request, if any.
pub fn client_subnet_of(message: &Message) -> Option<(IpAddr, u8)> {
    let edns = message.extensions().as_ref()?;
    match edns.option(EdnsCode::Subnet)? {
        EdnsOption::Subnet(subnet) => Some((subnet.addr(), subnet.source_prefix())),
        _ => None,
    }
}

/// Mask `ip` to `prefix` bits and zero the host part, per RFC 7871 privacy
/// guidance.
pub fn mask_subnet(ip: IpAddr, prefix_v4: u8, prefix_v6: u8) -> (IpAddr, u8) {
    match ip {
        IpAddr::V4(v4) => {
            let prefix = prefix_v4.min(32);
            let bits = u32::from(v4);
            let mask = if prefix == 0 { 0 } else { u32::MAX << (32 - prefix) };
            (IpAddr::V4(Ipv4Addr::from(bits & mask)), prefix)
        }
        IpAddr::V6(v6) => {
            let prefix = prefix_v6.min(128);
            let bits = u128::from(v6);
            let mask = if prefix == 0 { 0 } else { u128::MAX << (128 - prefix) };
            (IpAddr::V6(Ipv6Addr::from(bits & mask)), prefix)
        }
    }
}

/// Attach a masked EDNS client subnet option to an outbound query.
pub fn attach_client_subnet(message: &mut Message, ip: IpAddr, prefix_v4: u8, prefix_v6: u8) {
    let (masked, prefix) = mask_subnet(ip, prefix_v4, prefix_v6);
    let mut edns = message.extensions().clone().unwrap_or_else(Edns::new);
    if edns.max_payload() < 512 {
        edns.set_max_payload(1232);
    }
    edns.options_mut()
        .insert(EdnsOption::Subnet(ClientSubnet::new(masked, prefix, 0)));
    message.set_edns(edns);
}

/// Drop a client-subnet option whose source prefix exceeds the address
/// family's width; some upstreams echo malformed lengths.
pub fn normalize_client_subnet(message: &mut Message) {
    let Some(edns) = message.extensions().as_ref() else {
        return;
    };
    let bad = match edns.option(EdnsCode::Subnet) {
        Some(EdnsOption::Subnet(subnet)) => {
            let width = match subnet.addr() {
                IpAddr::V4(_) => 32,
                IpAddr::V6(_) => 128,
            };
            subnet.source_prefix() > width
        }
        _ => false,
    };
    if bad {
        let mut edns = edns.clone();
        edns.options_mut().remove(EdnsCode::Subnet);
        message.set_edns(edns);
    }
}

/// Decode a PTR question name (`4.3.2.1.in-addr.arpa`, nibble form for v6)
/// back into the address it asks about.
pub fn ptr_name_to_ip(name: &str) -> Option<IpAddr> {
    if let Some(rest) = name.strip_suffix(".in-addr.arpa") {
        let mut octets: Vec<u8> = Vec::with_capacity(4);
        for part in rest.split('.').rev() {
            octets.push(part.parse().ok()?);
        }
        let arr: [u8; 4] = octets.try_into().ok()?;
        return Some(IpAddr::V4(Ipv4Addr::from(arr)));
    }

    if let Some(rest) = name.strip_suffix(".ip6.arpa") {
        let nibbles: Vec<u8> = rest
            .split('.')
            .rev()
            .map(|part| u8::from_str_radix(part, 16).ok())
            .collect::<Option<Vec<u8>>>()?;
        if nibbles.len() != 32 {
            return None;
        }
        let mut bytes = [0u8; 16];
        for (i, pair) in nibbles.chunks(2).enumerate() {
            bytes[i] = (pair[0] << 4) | pair[1];
        }
        return Some(IpAddr::V6(Ipv6Addr::from(bytes)));
    }

    None
}

pub fn encode(message: &Message) -> Result<Vec<u8>, CoreError> {
    message
        .to_vec()
        .map_err(|e| CoreError::WireFormat(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use aegis_dns_domain::RecordType;

    #[test]
    fn request_roundtrip() {
        let question = Question::new("example.com", RecordType::A);
        let query = build_query(&question, false).unwrap();
        let bytes = encode(&query).unwrap();
        let (parsed, reparsed_question) = parse_request(&bytes).unwrap();
        assert_eq!(parsed.id(), query.id());
        assert_eq!(reparsed_question.name, question.name);
        assert_eq!(reparsed_question.qtype, RecordType::A);
    }

    #[test]
    fn rewrite_record_enforces_min_ttl() {
        let name = fqdn("example.com").unwrap();
        let record =
            rewrite_record(&name, &RewriteValue::A("1.2.3.4".parse().unwrap()), 0).unwrap();
        assert_eq!(record.ttl(), 1);
    }

    #[test]
    fn svc_params_accept_ech_and_alias() {
        let params = vec![
            ("alpn".to_string(), "h2".to_string()),
            ("ech".to_string(), "AAAA".to_string()),
        ];
        assert_eq!(svc_params(&params).unwrap().len(), 2);

        let alias = vec![("echconfig".to_string(), "AAAA".to_string())];
        assert_eq!(svc_params(&alias).unwrap().len(), 1);

        let bogus = vec![("mystery".to_string(), "x".to_string())];
        assert!(svc_params(&bogus).is_err());
    }

    #[test]
    fn ptr_names_decode_to_addresses() {
        assert_eq!(
            ptr_name_to_ip("10.1.168.192.in-addr.arpa"),
            Some("192.168.1.10".parse().unwrap())
        );
        let v6 = "1.0.0.0.0.0.0.0.0.0.0.0.0.0.0.0.0.0.0.0.0.0.0.0.0.0.0.0.0.0.0.0.ip6.arpa";
        assert_eq!(ptr_name_to_ip(v6), Some("::1".parse().unwrap()));
        assert_eq!(ptr_name_to_ip("example.com"), None);
    }

    #[test]
    fn subnet_masking_zeroes_host_bits() {
        let (masked, prefix) = mask_subnet("192.168.12.34".parse().unwrap(), 24, 56);
        assert_eq!(masked, "192.168.12.0".parse::<IpAddr>().unwrap());
        assert_eq!(prefix, 24);
    }
}
