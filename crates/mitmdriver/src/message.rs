//! The two concrete message shapes a chain can be run against.

/// An ordered header list. Kept as `Vec<(String, String)>` rather than a
/// map so that repeated headers and declaration order survive rewriting,
/// the same tradeoff `httpserver::serve::common::Header` makes for its own
/// header list.
pub type Headers = Vec<(String, String)>;

pub fn header_get<'a>(headers: &'a Headers, name: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case(name))
        .map(|(_, v)| v.as_str())
}

pub fn header_set(headers: &mut Headers, name: &str, value: impl Into<String>) {
    if let Some(entry) = headers.iter_mut().find(|(k, _)| k.eq_ignore_ascii_case(name)) {
        entry.1 = value.into();
    } else {
        headers.push((name.to_string(), value.into()));
    }
}

pub fn header_append(headers: &mut Headers, name: &str, value: impl Into<String>) {
    headers.push((name.to_string(), value.into()));
}

pub fn header_remove(headers: &mut Headers, name: &str) {
    headers.retain(|(k, _)| !k.eq_ignore_ascii_case(name));
}

#[derive(Debug, Clone)]
pub struct RequestMessage {
    pub method: String,
    pub uri: String,
    pub version: String,
    pub headers: Headers,
    pub body: Vec<u8>,
}

impl RequestMessage {
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.body.len() + 256);
        out.extend_from_slice(format!("{} {} {}\r\n", self.method, self.uri, self.version).as_bytes());
        for (name, value) in &self.headers {
            out.extend_from_slice(format!("{name}: {value}\r\n").as_bytes());
        }
        out.extend_from_slice(b"\r\n");
        out.extend_from_slice(&self.body);
        out
    }
}

#[derive(Debug, Clone)]
pub struct ResponseMessage {
    pub version: String,
    pub status: u16,
    pub reason: String,
    pub headers: Headers,
    pub body: Vec<u8>,
}

impl ResponseMessage {
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.body.len() + 256);
        out.extend_from_slice(
            format!("{} {} {}\r\n", self.version, self.status, self.reason).as_bytes(),
        );
        for (name, value) in &self.headers {
            out.extend_from_slice(format!("{name}: {value}\r\n").as_bytes());
        }
        out.extend_from_slice(b"\r\n");
        out.extend_from_slice(&self.body);
        out
    }
}

/// The value a chain is run against: either side of the exchange.
#[derive(Debug, Clone)]
pub enum Message {
    Request(RequestMessage),
    Response(ResponseMessage),
}

impl Message {
    pub fn into_request(self) -> Option<RequestMessage> {
        match self {
            Message::Request(r) => Some(r),
            Message::Response(_) => None,
        }
    }

    pub fn into_response(self) -> Option<ResponseMessage> {
        match self {
            Message::Response(r) => Some(r),
            Message::Request(_) => None,
        }
    }
}
