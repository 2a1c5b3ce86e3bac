use bstr::ByteSlice;
use std::{
    future::Future,
    io::{self, ErrorKind},
    pin::Pin,
    sync::Arc,
};
use tokio::fs;
use dkim_parse::verifier::LookupTxt;

pub type LookupOutput = Vec<io::Result<Vec<u8>>>;
pub type LookupFuture<'a> = Pin<Box<dyn Future<Output = io::Result<LookupOutput>> + Send + 'a>>;

#[derive(Clone)]
pub struct MockLookup(Arc<dyn Fn(&str) -> LookupFuture<'_> + Send + Sync>);

impl MockLookup {
    pub fn new(f: impl Fn(&str) -> LookupFuture<'_> + Send + Sync + 'static) -> Self {
        Self(Arc::new(f))
    }

    /// Answers every query with the same single record.
    pub fn with_record(record: impl Into<String>) -> Self {
        let record = record.into();
        Self::new(move |_| {
            let record = record.clone();
            Box::pin(async move { Ok::<_, io::Error>(vec![Ok(record.into_bytes())]) })
        })
    }

    /// Fails every query with the given error kind.
    pub fn failing(kind: ErrorKind) -> Self {
        Self::new(move |_| Box::pin(async move { Err::<LookupOutput, _>(io::Error::from(kind)) }))
    }
}

impl LookupTxt for MockLookup {
    type Answer = LookupOutput;
    type Query<'a> = Pin<Box<dyn Future<Output = io::Result<Self::Answer>> + Send + 'a>>;

    fn lookup_txt(&self, domain: &str) -> Self::Query<'_> {
        let domain = domain.to_owned();

        Box::pin(async move { self.0(&domain).await })
    }
}

pub const ED25519_PUBLIC_KEY: &str = "RKL/14bevWut53jep1FasMYMa52nKJ/mOXRVEWVOJW8=";

/// Serves the key records for the signed messages in `tests/data`.
pub fn fixture_lookup() -> MockLookup {
    MockLookup::new(|name| Box::pin(fixture_records(name.to_owned())))
}

async fn fixture_records(name: String) -> io::Result<LookupOutput> {
    let file = match name.as_str() {
        "ed._domainkey.example.com." => {
            let record = format!("v=DKIM1; k=ed25519; p={ED25519_PUBLIC_KEY}");
            return Ok(vec![Ok(record.into_bytes())]);
        }
        "rsa._domainkey.example.org." | "rsa._domainkey.example.net." => {
            "tests/data/rsa2048.pub.pem"
        }
        "small._domainkey.example.com." => "tests/data/rsa1024.pub.pem",
        _ => return Err(ErrorKind::NotFound.into()),
    };

    let base64 = read_public_key_file_base64(file).await?;

    Ok(vec![Ok(format!("v=DKIM1; k=rsa; p={base64}").into_bytes())])
}

pub async fn read_public_key_file_base64(file_name: &str) -> io::Result<String> {
    let s = fs::read_to_string(file_name).await?;
    let mut key_base64: Vec<_> = s.lines().skip(1).collect();
    key_base64.pop();
    Ok(key_base64.join(""))
}

pub async fn read_message(file_name: &str) -> Vec<u8> {
    fs::read(format!("tests/data/{file_name}")).await.unwrap()
}

/// Replaces the first occurrence of `from` in the message.
pub fn tamper(message: &[u8], from: &str, to: &str) -> Vec<u8> {
    assert!(message.contains_str(from), "{from:?} not in message");
    message.replacen(from, to, 1)
}
