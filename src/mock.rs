// Demonstration records
//
// Used when the store starts empty so the dashboard has something to show.
// Records are written in the camelCase shape of the legacy mock data and go
// through the same boundary adapter as any other import.

use anyhow::Result;
use serde_json::json;
use tracing::info;

use crate::entities::Beneficiary;
use crate::store::{RecordStore, StoreError};

pub fn mock_beneficiaries() -> Result<Vec<Beneficiary>> {
    let records = vec![
        json!({
            "id": "ben-001",
            "name": "Mohammed Al-Najjar",
            "fullName": "Mohammed Khalil Al-Najjar",
            "nationalId": "900123456",
            "phone": "0599123456",
            "address": "Al-Rimal, Gaza City",
            "detailedAddress": { "governorate": "gaza" },
            "organizationId": "org-1",
            "familyId": "fam-1",
            "identityStatus": "verified",
            "status": "active",
            "createdAt": "2024-01-15T09:30:00Z",
            "updatedAt": "2024-01-20T11:00:00Z"
        }),
        json!({
            "id": "ben-002",
            "name": "Fatima Abu Salem",
            "fullName": "Fatima Ahmad Abu Salem",
            "nationalId": "900234567",
            "phone": "0599234567",
            "address": "Khan Younis Camp",
            "detailedAddress": { "governorate": "khan_younis" },
            "organizationId": "org-1",
            "identityStatus": "pending",
            "status": "active",
            "createdAt": "2024-01-18T14:10:00Z"
        }),
        json!({
            "id": "ben-003",
            "name": "Ahmad Shaheen",
            "fullName": "Ahmad Yousef Shaheen",
            "nationalId": "900345678",
            "phone": "0599345678",
            "address": "Jabalia",
            "detailedAddress": { "governorate": "north_gaza" },
            "identityStatus": "rejected",
            "status": "pending",
            "createdAt": "2024-02-02T08:45:00Z"
        }),
        json!({
            "id": "ben-004",
            "name": "Mariam Hassan",
            "fullName": "Mariam Saleh Hassan",
            "nationalId": "900456789",
            "phone": "0599456789",
            "address": "Deir al-Balah",
            "detailedAddress": { "governorate": "deir_al_balah" },
            "organizationId": "org-2",
            "familyId": "fam-2",
            "identityStatus": "pending",
            "status": "active",
            "createdAt": "2024-02-10T10:00:00Z"
        }),
        json!({
            "id": "ben-005",
            "name": "Yousef Barakat",
            "fullName": "Yousef Ibrahim Barakat",
            "nationalId": "900567890",
            "phone": "0599567890",
            "address": "Rafah",
            "detailedAddress": { "governorate": "rafah" },
            "identityStatus": "pending",
            "status": "suspended",
            "createdAt": "2024-02-21T16:20:00Z"
        }),
        json!({
            "id": "ben-006",
            "name": "Huda Al-Masri",
            "fullName": "Huda Nasser Al-Masri",
            "nationalId": "900678901",
            "phone": "0599678901",
            "address": "Tal al-Hawa, Gaza City",
            "detailedAddress": { "governorate": "gaza" },
            "organizationId": "org-2",
            "identityStatus": "verified",
            "status": "active",
            "createdAt": "2024-03-01T12:00:00Z"
        }),
        json!({
            "id": "ben-007",
            "name": "Khaled Odeh",
            "fullName": "Khaled Mahmoud Odeh",
            "nationalId": "900789012",
            "phone": "0599789012",
            "address": "Beit Lahia",
            "detailedAddress": { "governorate": "north_gaza" },
            "identityStatus": "rejected",
            "status": "active",
            "createdAt": "2024-03-05T07:50:00Z"
        }),
        json!({
            "id": "ben-008",
            "name": "Samar Abu Daqqa",
            "nationalId": "900890123",
            "phone": "0599890123",
            "address": "Bani Suheila",
            "detailedAddress": { "governorate": "khan_younis" },
            "createdAt": "2024-03-12T13:15:00Z"
        }),
    ];

    records.into_iter().map(Beneficiary::from_record).collect()
}

/// Insert the demonstration records if the store has none. Returns how many
/// were inserted.
pub async fn seed_if_empty(store: &dyn RecordStore) -> Result<usize> {
    if store.count().await? > 0 {
        return Ok(0);
    }

    let mut inserted = 0;
    for beneficiary in mock_beneficiaries()? {
        match store.insert(&beneficiary).await {
            Ok(()) => inserted += 1,
            Err(StoreError::Conflict(_)) => {}
            Err(e) => return Err(e.into()),
        }
    }

    info!(count = inserted, "seeded demonstration beneficiaries");
    Ok(inserted)
}
