//! Synthetic response construction for every terminal decision that never
//! reaches an upstream.

use crate::wire;
use aegis_dns_domain::{
    BlockReason, CoreError, Question, RecordType, RewriteRcode, RewriteValue,
};
use hickory_proto::op::{Message, ResponseCode};
use hickory_proto::rr::rdata::{A, AAAA, PTR};
use hickory_proto::rr::{RData, Record};
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

/// TTL on blocked and rewritten answers.
pub const SYNTH_TTL: u32 = 10;
/// TTL on hosts/DHCP answers; local bindings move rarely.
pub const LOCAL_TTL: u32 = 3600;

/// Where blocked address queries point.
#[derive(Debug, Clone)]
pub struct Sinkhole {
    pub v4: Ipv4Addr,
    pub v6: Ipv6Addr,
    /// Deployment override for safebrowsing/parental blocks.
    pub safe: Option<IpAddr>,
}

impl Sinkhole {
    /// A/AAAA get a sinkhole address; every other type gets NXDOMAIN.
    pub fn blocked_response(
        &self,
        request: &Message,
        question: &Question,
        reason: BlockReason,
    ) -> Result<Message, CoreError> {
        let mut response = wire::response_for(request);

        let rdata = match question.qtype {
            RecordType::A => Some(RData::A(A(match (reason, self.safe) {
                (BlockReason::BlockList, _) | (_, None) => self.v4,
                (_, Some(IpAddr::V4(safe))) => safe,
                (_, Some(IpAddr::V6(_))) => self.v4,
            }))),
            RecordType::AAAA => Some(RData::AAAA(AAAA(match (reason, self.safe) {
                (BlockReason::BlockList, _) | (_, None) => self.v6,
                (_, Some(IpAddr::V6(safe))) => safe,
                (_, Some(IpAddr::V4(_))) => self.v6,
            }))),
            _ => None,
        };

        match rdata {
            Some(rdata) => {
                let name = wire::fqdn(&question.name)?;
                response.add_answer(Record::from_rdata(name, SYNTH_TTL, rdata));
                response.set_response_code(ResponseCode::NoError);
            }
            None => {
                response.set_response_code(ResponseCode::NXDomain);
            }
        }

        Ok(response)
    }
}

/// Answer from a rewrite decision: forced rcode plus zero or more synthetic
/// records. Every record TTL is ≥ 1 (wire::rewrite_record enforces it).
pub fn rewrite_response(
    request: &Message,
    question: &Question,
    rcode: RewriteRcode,
    answers: &[RewriteValue],
) -> Result<Message, CoreError> {
    let mut response = wire::response_for(request);
    response.set_response_code(wire::rcode_of(rcode));

    let name = wire::fqdn(&question.name)?;
    for value in answers {
        response.add_answer(wire::rewrite_record(&name, value, SYNTH_TTL)?);
    }

    Ok(response)
}

/// A/AAAA answer straight from the hosts/DHCP view.
pub fn local_address_response(
    request: &Message,
    question: &Question,
    ips: &[IpAddr],
) -> Result<Message, CoreError> {
    let mut response = wire::response_for(request);
    response.set_response_code(ResponseCode::NoError);
    let name = wire::fqdn(&question.name)?;

    for ip in ips {
        let rdata = match (question.qtype, ip) {
            (RecordType::A, IpAddr::V4(v4)) => RData::A(A(*v4)),
            (RecordType::AAAA, IpAddr::V6(v6)) => RData::AAAA(AAAA(*v6)),
            _ => continue,
        };
        response.add_answer(Record::from_rdata(name.clone(), LOCAL_TTL, rdata));
    }

    Ok(response)
}

/// PTR answer from the hosts/DHCP view. `names` already carry the trailing
/// dot; an empty set answers NXDOMAIN for the covered range.
pub fn local_ptr_response(
    request: &Message,
    question: &Question,
    names: &[String],
) -> Result<Message, CoreError> {
    let mut response = wire::response_for(request);

    if names.is_empty() {
        response.set_response_code(ResponseCode::NXDomain);
        return Ok(response);
    }

    response.set_response_code(ResponseCode::NoError);
    let qname = wire::fqdn(&question.name)?;
    for name in names {
        let target = wire::fqdn(name)?;
        response.add_answer(Record::from_rdata(
            qname.clone(),
            LOCAL_TTL,
            RData::PTR(PTR(target)),
        ));
    }

    Ok(response)
}

#[cfg(test)]
mod tests {
    use super::*;
    use aegis_dns_domain::RecordType;

    fn request(name: &str, qtype: RecordType) -> (Message, Question) {
        let question = Question::new(name, qtype);
        let message = wire::build_query(&question, false).unwrap();
        (message, question)
    }

    fn sinkhole() -> Sinkhole {
        Sinkhole {
            v4: Ipv4Addr::UNSPECIFIED,
            v6: Ipv6Addr::UNSPECIFIED,
            safe: None,
        }
    }

    #[test]
    fn blocked_a_query_gets_sinkhole_address() {
        let (req, q) = request("ads.example.com", RecordType::A);
        let resp = sinkhole()
            .blocked_response(&req, &q, BlockReason::BlockList)
            .unwrap();
        assert_eq!(resp.response_code(), ResponseCode::NoError);
        assert_eq!(resp.answers().len(), 1);
        assert!(resp.answers()[0].ttl() >= 1);
        assert!(matches!(resp.answers()[0].data(), RData::A(A(ip)) if ip.is_unspecified()));
    }

    #[test]
    fn blocked_txt_query_gets_nxdomain() {
        let (req, q) = request("ads.example.com", RecordType::TXT);
        let resp = sinkhole()
            .blocked_response(&req, &q, BlockReason::BlockList)
            .unwrap();
        assert_eq!(resp.response_code(), ResponseCode::NXDomain);
        assert!(resp.answers().is_empty());
    }

    #[test]
    fn safe_sinkhole_override_applies_to_reputation_blocks() {
        let (req, q) = request("bad.example.com", RecordType::A);
        let mut sink = sinkhole();
        sink.safe = Some("94.140.14.35".parse().unwrap());
        let resp = sink
            .blocked_response(&req, &q, BlockReason::SafeBrowsing)
            .unwrap();
        assert!(
            matches!(resp.answers()[0].data(), RData::A(A(ip)) if ip.to_string() == "94.140.14.35")
        );
    }

    #[test]
    fn rewrite_response_carries_values() {
        let (req, q) = request("example.com", RecordType::HTTPS);
        let value = RewriteValue::SvcRecord {
            https: true,
            priority: 1,
            target: ".".into(),
            params: vec![
                ("alpn".into(), "h2".into()),
                ("ech".into(), "AAAA".into()),
            ],
        };
        let resp =
            rewrite_response(&req, &q, RewriteRcode::NoError, std::slice::from_ref(&value))
                .unwrap();
        assert_eq!(resp.answers().len(), 1);
        assert_eq!(
            resp.answers()[0].record_type(),
            wire::to_wire_type(RecordType::HTTPS)
        );
    }

    #[test]
    fn local_answer_filters_by_family() {
        let (req, q) = request("nas.lan", RecordType::A);
        let ips = vec![
            "192.168.1.10".parse().unwrap(),
            "fd00::10".parse().unwrap(),
        ];
        let resp = local_address_response(&req, &q, &ips).unwrap();
        assert_eq!(resp.answers().len(), 1);
    }
}
