//! # Messenger Demo
//!
//! This example walks through the encrypted messenger end to end:
//! 1. A patient and a doctor each get a device key pair
//! 2. The patient seals a message for the doctor
//! 3. The doctor opens it and checks the sender fingerprint
//! 4. Tamper detection on a modified envelope
//! 5. Password backup and restore on a new device
//!
//! ## Run
//!
//! ```bash
//! RUST_LOG=scolio_core=debug cargo run --example messenger_demo
//! ```

use std::sync::Arc;

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use scolio_core::{
    EncryptedEnvelope, FileStorage, KeyCustody, MemoryStorage, Messenger, MessengerConfig,
};

#[tokio::main]
async fn main() -> scolio_core::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "scolio_core=info".into()),
        )
        .init();

    println!("=================================================");
    println!("         SCOLIO MESSENGER DEMO  v{}", scolio_core::version());
    println!("=================================================\n");

    // =========================================================================
    // STEP 1: Two devices, two identities
    // =========================================================================
    println!("1. Creating device identities...\n");

    let dir = tempfile::tempdir()?;
    let patient_storage = Arc::new(FileStorage::open(dir.path().join("patient")).await?);
    let patient = Messenger::new(Arc::new(KeyCustody::new(
        patient_storage,
        MessengerConfig::default(),
    )?));

    let doctor = Messenger::new(Arc::new(KeyCustody::new(
        Arc::new(MemoryStorage::new()),
        MessengerConfig::default(),
    )?));

    let patient_pair = patient.custody().ensure_key_pair().await?;
    let doctor_pair = doctor.custody().ensure_key_pair().await?;

    println!("   Patient fingerprint: {}", patient_pair.fingerprint);
    println!("   Doctor fingerprint:  {}", doctor_pair.fingerprint);
    println!();

    // =========================================================================
    // STEP 2: Patient seals a message
    // =========================================================================
    println!("2. Patient sends \"Hello\"...\n");

    let message = patient
        .seal_message("chat-42", "patient-1", &doctor_pair.public_key, "Hello")
        .await?;
    let wire = message.envelope.to_json()?;

    println!("   Message id: {}", message.id);
    println!("   Envelope on the wire: {} bytes of JSON", wire.len());
    println!();

    // =========================================================================
    // STEP 3: Doctor opens it
    // =========================================================================
    println!("3. Doctor opens the envelope...\n");

    let received = EncryptedEnvelope::from_json(&wire)?;
    let text = doctor.open_received(&received).await?;
    let sender_fingerprint = scolio_core::crypto::fingerprint(&received.sender_public_key)?;

    println!("   Plaintext: {:?}", text);
    println!(
        "   Sender fingerprint matches patient: {}",
        sender_fingerprint == patient_pair.fingerprint
    );

    let own_view = patient.open_message(&patient_pair, &message, &doctor_pair.public_key)?;
    println!("   Patient's own view: {:?} (is_own = {})", own_view.text, own_view.is_own);
    println!();

    // =========================================================================
    // STEP 4: Tamper detection
    // =========================================================================
    println!("4. Flipping one ciphertext bit...\n");

    let mut tampered = received.clone();
    let mut bytes = BASE64.decode(&tampered.ciphertext).unwrap_or_default();
    if let Some(first) = bytes.first_mut() {
        *first ^= 0x01;
    }
    tampered.ciphertext = BASE64.encode(bytes);

    match doctor.open_received(&tampered).await {
        Ok(_) => println!("   Unexpectedly opened a tampered envelope"),
        Err(e) => println!("   Rejected: {} (code {})", e, e.code()),
    }
    println!();

    // =========================================================================
    // STEP 5: Backup and restore
    // =========================================================================
    println!("5. Backing up the patient's key pair...\n");

    let blob = patient.custody().export_keys("correct horse battery staple").await?;
    println!("   Backup blob: {} characters", blob.len());

    let new_device = KeyCustody::new(Arc::new(MemoryStorage::new()), MessengerConfig::default())?;

    match new_device.import_keys(&blob, "wrong password").await {
        Ok(_) => println!("   Unexpectedly accepted a wrong password"),
        Err(e) => println!("   Wrong password rejected: {}", e),
    }

    let restored = new_device
        .import_keys(&blob, "correct horse battery staple")
        .await?;
    println!(
        "   Restored fingerprint matches: {}",
        restored.fingerprint == patient_pair.fingerprint
    );

    println!("\n=================================================");
    println!("                 DEMO COMPLETE");
    println!("=================================================");

    Ok(())
}
