//! Fixed key material for tests
//!
//! Generating RSA keys is slow and `ring` cannot do it, so tests share one
//! 2048-bit key. Never use it outside tests.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;

/// PKCS#8 DER of the shared RSA test key, base64 encoded
const RSA_TEST_KEY_PKCS8_B64: &str = concat!(
    "MIIEvwIBADANBgkqhkiG9w0BAQEFAASCBKkwggSlAgEAAoIBAQDDvq3JRC1O9vjwogfTtYhZ1RQd",
    "eBIyLiKirERjYkKBlu8JQ/MqhovcixKHnVl9fmaCQl/J/EyNXGvuFIZP/K1lg1Yauq6IoQkjcw7M",
    "qt90PUNqObcmEn59HjO2kHqgaCLXxq9130vOhQ42gYw+NlcCpIEegJ6OtNAu+bLUTNdUOc8exVZQ",
    "WlZ9FlhhooxZ+aVmNfILCmL3ZWH2JdSpTzJy+BvCqABhlwwf4nvkWSSKVBHdo2I3+lb8Uzz9LGe0",
    "wzs9awLvgBtVr9DwurFvEnuNn8GhubATu5ciUWBRq2iXSDwIn271xlonN7FbXwxQPlYQfn5roCsU",
    "ZrAUPHWkmGs3AgMBAAECggEAEyd8f/5g5KI8N+fTFj9kSU4VetC+DxT+pKZwxrzdvyqS13hDujyS",
    "QRGGzahzElmlFEgEcZJztz18/j4Z6ofSO+W/LjxoScxgRYzDvPlXhltcVm+xYVNb90hWTR4UMdAe",
    "4Lh7gPBJzbqtal4A6DGPEB4i2GZDnblJyd77RdUDGSWnG4yrSIOybZmnYYrzF0keSe2xlciEq/Jx",
    "V66qDcilX6pJuKOFhkvaKhGyFNJ/oVvn+J9QqiX/r4nLA72TjfxczbzBlTHrE1raZfcLiVJtxq2d",
    "xRmFwPk58a/SEvtbpeRxbgxmTMKqf/wZ/gbszBfzQJQHLH9VjhtfcO64c6NQYQKBgQDvRN/8mV8H",
    "enEv6248sV+k8FWaJ8CEBTtSJXpkXN1mO41wkU+wKu3x7dQd1RoyPMWXo6j3cJ7P/di9Ch9o9X1m",
    "QItB8ymC1z8v1smgBaSIVi0h6txRS8VKRalRE5Jy167J69hkVFpm1WeBqZzxzXOdbuVOZjPUnWMM",
    "zlW7GzJcUQKBgQDRbq6/gCx9tB8SOBPKuB8l+3xTcBQU+kNmEyygdn26KSOjNj7Mcs2mUGZsK5Cu",
    "r52sYipEt67OBz3XRUzQTIyTovRMn78NfD9Mo+I88t8n/DFCPE1PCIMEiEb8fRKCA3U594ADCiFf",
    "HVX0m/c+HiqXt4roEPq59xO0BtzkrUFVBwKBgQCYEileDUiFoz+PGk4dCwrj9NAjQwKrpfuW8TUB",
    "1rfsgwsZMXH5YL+MlQDM2SVmKpPXFfCNG6oEPa1kMKvX9Lb3pywbBWYrv4xsZlINf6ib8lGLDg9r",
    "KAJDe1Tqr8rTbNutgFUvJyGx3A6GLXwPfuntdI8PLgvhJQrQF9ALNHTkkQKBgQCd1EizHrfov45O",
    "353ivuEScbSe+K7ZpESYr0iJYOKdIZWu0RmAX+AlPyAA0tAFJWmw2IW8JaUBtSlgiuQ5cgba2Ao9",
    "mIGVexYE/thnUCzmaEMDBIjKT8LU7pJ4gxUoj8yPM7rwD3lYwbXeUo9/66HzlimDfBBHhzD9EdL0",
    "LrE2jwKBgQCia45g8bId68PhIGEjvrf/PY9jJ4RQDiAmYytUxk+pm5S+F++ts4ht6uMHdJwM32rh",
    "3IrkMIyRtc/FtHZBeWs7C1y1KXKHhLHy1XEV/QY9UqHlvD3JAAVVRUefJ23coJbOJMlOugIz3ADZ",
    "zu85SfD/n+EM39Y2kf6EDLBjWGtqUw==",);

/// PKCS#8 DER bytes of the shared RSA test key
///
/// # Panics
///
/// Never; the embedded constant is valid base64.
#[must_use]
pub fn rsa_test_key_pkcs8() -> Vec<u8> {
    STANDARD
        .decode(RSA_TEST_KEY_PKCS8_B64)
        .expect("embedded RSA test key is valid base64")
}
