use nfse_core::identity::Identity;
use openssl::asn1::Asn1Time;
use openssl::bn::BigNum;
use openssl::hash::MessageDigest;
use openssl::pkcs12::Pkcs12;
use openssl::pkey::{PKey, Private};
use openssl::rsa::Rsa;
use openssl::x509::{X509, X509NameBuilder};

pub const P12_PASSWORD: &str = "segredo";

#[allow(dead_code)]
pub fn test_key() -> PKey<Private> {
    let rsa = Rsa::generate(2048).expect("generate rsa key");
    PKey::from_rsa(rsa).expect("wrap rsa key")
}

#[allow(dead_code)]
pub fn test_cert(key: &PKey<Private>) -> X509 {
    let mut name = X509NameBuilder::new().expect("name builder");
    name.append_entry_by_text("CN", "NFSe Teste")
        .expect("common name");
    name.append_entry_by_text("O", "Prefeitura Exemplo")
        .expect("organization");
    let name = name.build();

    let mut builder = X509::builder().expect("x509 builder");
    builder.set_version(2).expect("version");
    let serial = BigNum::from_u32(1)
        .expect("serial bignum")
        .to_asn1_integer()
        .expect("serial asn1");
    builder.set_serial_number(&serial).expect("serial");
    builder.set_subject_name(&name).expect("subject");
    builder.set_issuer_name(&name).expect("issuer");
    builder.set_pubkey(key).expect("pubkey");
    builder
        .set_not_before(&Asn1Time::days_from_now(0).expect("not before"))
        .expect("set not before");
    builder
        .set_not_after(&Asn1Time::days_from_now(365).expect("not after"))
        .expect("set not after");
    builder.sign(key, MessageDigest::sha256()).expect("sign cert");
    builder.build()
}

#[allow(dead_code)]
pub fn test_pkcs12_der(password: &str) -> Vec<u8> {
    let key = test_key();
    let cert = test_cert(&key);
    let pkcs12 = Pkcs12::builder()
        .name("nfse teste")
        .pkey(&key)
        .cert(&cert)
        .build2(password)
        .expect("build pkcs12");
    pkcs12.to_der().expect("pkcs12 der")
}

#[allow(dead_code)]
pub fn test_identity() -> Identity {
    let der = test_pkcs12_der(P12_PASSWORD);
    Identity::from_pkcs12(&der, P12_PASSWORD).expect("resolve identity")
}

#[allow(dead_code)]
pub fn fixture(relative: &str) -> String {
    let path = std::path::Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("tests/fixtures")
        .join(relative);
    std::fs::read_to_string(&path).unwrap_or_else(|e| panic!("read fixture {relative}: {e}"))
}

#[allow(dead_code)]
pub fn fixtures_dir(relative: &str) -> std::path::PathBuf {
    std::path::Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("tests/fixtures")
        .join(relative)
}
