//! Repository layer: entity-scoped database operations.
//!
//! One sub-module per entity; every public function is re-exported here.
//! Ids are stored as UUID text, timestamps as UTC `%Y-%m-%d %H:%M:%S`.

mod audit;
mod invitation;
mod order;
mod organization;
mod patient;
mod relationship;
mod session;
mod user;

use chrono::{NaiveDateTime, Timelike, Utc};
use uuid::Uuid;

use super::DatabaseError;

pub use audit::*;
pub use invitation::*;
pub use order::*;
pub use organization::*;
pub use patient::*;
pub use relationship::*;
pub use session::*;
pub use user::*;

pub(crate) const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Current UTC time at whole-second precision, matching stored timestamps.
pub fn utc_now() -> NaiveDateTime {
    let now = Utc::now().naive_utc();
    now.with_nanosecond(0).unwrap_or(now)
}

pub(crate) fn format_datetime(dt: &NaiveDateTime) -> String {
    dt.format(DATETIME_FORMAT).to_string()
}

pub(crate) fn parse_datetime(s: &str) -> NaiveDateTime {
    NaiveDateTime::parse_from_str(s, DATETIME_FORMAT)
        .or_else(|_| NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S"))
        .unwrap_or_default()
}

pub(crate) fn parse_id(s: &str) -> Result<Uuid, DatabaseError> {
    Uuid::parse_str(s).map_err(|e| DatabaseError::ConstraintViolation(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::sqlite::open_memory_database;
    use crate::models::*;
    use chrono::{Duration, NaiveDate};
    use rusqlite::Connection;

    fn test_db() -> Connection {
        open_memory_database().unwrap()
    }

    fn at(s: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(s, DATETIME_FORMAT).unwrap()
    }

    fn make_org(conn: &Connection, name: &str, org_type: OrgType) -> Organization {
        let org = Organization {
            id: Uuid::new_v4(),
            name: name.into(),
            org_type,
            npi: Some("1234567893".into()),
            address: None,
            phone: None,
            status: OrgStatus::Active,
            created_at: at("2024-03-01 09:00:00"),
        };
        insert_organization(conn, &org).unwrap();
        org
    }

    fn make_user(conn: &Connection, org: &Organization, email: &str, role: UserRole) -> User {
        let user = User {
            id: Uuid::new_v4(),
            organization_id: org.id,
            email: email.into(),
            first_name: "Ada".into(),
            last_name: "Jones".into(),
            role,
            npi: None,
            specialty: Some("Orthopedics".into()),
            is_active: true,
            created_at: at("2024-03-01 09:00:00"),
            last_login_at: None,
        };
        insert_user(conn, &user, "pbkdf2$hash").unwrap();
        user
    }

    fn make_patient(conn: &Connection, org: &Organization) -> Patient {
        let patient = Patient {
            id: Uuid::new_v4(),
            organization_id: org.id,
            mrn: Some("MRN-001".into()),
            first_name: "Sam".into(),
            last_name: "Rivera".into(),
            date_of_birth: Some(NaiveDate::from_ymd_opt(1980, 5, 4).unwrap()),
            gender: None,
            phone: None,
            email: None,
            address: None,
            city: None,
            state: None,
            zip: None,
            insurance_provider: None,
            insurance_policy_number: None,
            created_at: at("2024-03-01 09:00:00"),
            updated_at: at("2024-03-01 09:00:00"),
        };
        insert_patient(conn, &patient).unwrap();
        patient
    }

    fn make_order(
        conn: &Connection,
        number: &str,
        patient: &Patient,
        org: &Organization,
        user: &User,
        created: &str,
    ) -> Order {
        let order = Order {
            id: Uuid::new_v4(),
            order_number: number.into(),
            patient_id: patient.id,
            referring_organization_id: org.id,
            radiology_organization_id: None,
            created_by: user.id,
            dictation: "Right shoulder MRI for labral tear".into(),
            modality: Some("mri".into()),
            body_part: Some("shoulder".into()),
            laterality: Some("right".into()),
            icd10_codes: "S43.431A,M25.511".into(),
            icd10_descriptions: Order::encode_descriptions(["SLAP lesion", "Pain in right shoulder"]),
            cpt_code: Some("73222".into()),
            cpt_description: Some("MRI upper extremity with contrast".into()),
            compliance_score: Some(9),
            validation_status: Some("valid".into()),
            validation_notes: Some("ok".into()),
            status: OrderStatus::PendingSignature,
            signed_by: None,
            signed_at: None,
            signature_name: None,
            patient_info_completed_by: None,
            created_at: at(created),
            updated_at: at(created),
        };
        insert_order(conn, &order).unwrap();
        order
    }

    #[test]
    fn datetime_helpers_round_trip() {
        let dt = at("2024-05-06 07:08:09");
        assert_eq!(format_datetime(&dt), "2024-05-06 07:08:09");
        assert_eq!(parse_datetime("2024-05-06T07:08:09"), dt);
        assert_eq!(parse_datetime("garbage"), NaiveDateTime::default());
        assert_eq!(utc_now().nanosecond(), 0);
    }

    #[test]
    fn organization_insert_and_list_by_type() {
        let conn = test_db();
        let clinic = make_org(&conn, "Valley Ortho", OrgType::Referring);
        make_org(&conn, "City Imaging", OrgType::Radiology);
        make_org(&conn, "Alpha Radiology", OrgType::Radiology);

        let found = get_organization(&conn, &clinic.id).unwrap().unwrap();
        assert_eq!(found, clinic);

        let radiology = list_organizations_by_type(&conn, OrgType::Radiology).unwrap();
        let names: Vec<&str> = radiology.iter().map(|o| o.name.as_str()).collect();
        assert_eq!(names, vec!["Alpha Radiology", "City Imaging"]);
    }

    #[test]
    fn suspended_organizations_not_listed() {
        let conn = test_db();
        let org = make_org(&conn, "City Imaging", OrgType::Radiology);
        update_organization_status(&conn, &org.id, OrgStatus::Suspended).unwrap();
        assert!(list_organizations_by_type(&conn, OrgType::Radiology).unwrap().is_empty());
        assert!(update_organization_status(&conn, &Uuid::new_v4(), OrgStatus::Active).is_err());
    }

    #[test]
    fn user_email_unique_case_insensitive() {
        let conn = test_db();
        let org = make_org(&conn, "Valley Ortho", OrgType::Referring);
        make_user(&conn, &org, "ada@valley.test", UserRole::Physician);

        let mut dup = make_user(&conn, &org, "other@valley.test", UserRole::Admin);
        dup.id = Uuid::new_v4();
        dup.email = "ADA@valley.test".into();
        let err = insert_user(&conn, &dup, "x").unwrap_err();
        assert!(matches!(err, DatabaseError::ConstraintViolation(_)));
    }

    #[test]
    fn user_credentials_lookup() {
        let conn = test_db();
        let org = make_org(&conn, "Valley Ortho", OrgType::Referring);
        let user = make_user(&conn, &org, "ada@valley.test", UserRole::Physician);

        let (found, hash) = get_user_credentials(&conn, "Ada@Valley.test").unwrap().unwrap();
        assert_eq!(found.id, user.id);
        assert_eq!(hash, "pbkdf2$hash");
        assert!(get_user_by_email(&conn, "nobody@valley.test").unwrap().is_none());

        update_last_login(&conn, &user.id, &at("2024-03-02 10:00:00")).unwrap();
        set_user_active(&conn, &user.id, false).unwrap();
        let reloaded = get_user(&conn, &user.id).unwrap().unwrap();
        assert_eq!(reloaded.last_login_at, Some(at("2024-03-02 10:00:00")));
        assert!(!reloaded.is_active);
        assert_eq!(list_users_by_organization(&conn, &org.id).unwrap().len(), 1);
    }

    #[test]
    fn sessions_expire() {
        let conn = test_db();
        let org = make_org(&conn, "Valley Ortho", OrgType::Referring);
        let user = make_user(&conn, &org, "ada@valley.test", UserRole::Physician);
        let created = at("2024-03-01 09:00:00");
        insert_session(
            &conn,
            &Session {
                token_hash: "h1".into(),
                user_id: user.id,
                created_at: created,
                expires_at: created + Duration::hours(12),
            },
        )
        .unwrap();

        let active = get_active_session(&conn, "h1", &(created + Duration::hours(1))).unwrap();
        assert_eq!(active.unwrap().user_id, user.id);
        let expired = get_active_session(&conn, "h1", &(created + Duration::hours(13))).unwrap();
        assert!(expired.is_none());

        assert_eq!(prune_expired_sessions(&conn, &(created + Duration::hours(13))).unwrap(), 1);
        assert!(!delete_session(&conn, "h1").unwrap());
    }

    #[test]
    fn session_logout_and_user_revocation() {
        let conn = test_db();
        let org = make_org(&conn, "Valley Ortho", OrgType::Referring);
        let user = make_user(&conn, &org, "ada@valley.test", UserRole::Physician);
        let created = at("2024-03-01 09:00:00");
        for hash in ["a", "b"] {
            insert_session(
                &conn,
                &Session {
                    token_hash: hash.into(),
                    user_id: user.id,
                    created_at: created,
                    expires_at: created + Duration::hours(1),
                },
            )
            .unwrap();
        }
        assert!(delete_session(&conn, "a").unwrap());
        assert_eq!(delete_user_sessions(&conn, &user.id).unwrap(), 1);
    }

    #[test]
    fn patient_search_and_update() {
        let conn = test_db();
        let org = make_org(&conn, "Valley Ortho", OrgType::Referring);
        let other = make_org(&conn, "Other Clinic", OrgType::Referring);
        let patient = make_patient(&conn, &org);
        make_patient(&conn, &other);

        assert_eq!(list_patients_by_organization(&conn, &org.id, None).unwrap().len(), 1);
        assert_eq!(list_patients_by_organization(&conn, &org.id, Some("riv")).unwrap().len(), 1);
        assert_eq!(list_patients_by_organization(&conn, &org.id, Some("MRN-0")).unwrap().len(), 1);
        assert!(list_patients_by_organization(&conn, &org.id, Some("zzz")).unwrap().is_empty());

        let update = PatientInfoUpdate {
            phone: Some("555-0100".into()),
            insurance_provider: Some("Acme Health".into()),
            ..Default::default()
        };
        update_patient_info(&conn, &patient.id, &update, &at("2024-03-05 12:00:00")).unwrap();
        let reloaded = get_patient(&conn, &patient.id).unwrap().unwrap();
        assert_eq!(reloaded.phone.as_deref(), Some("555-0100"));
        assert_eq!(reloaded.insurance_provider.as_deref(), Some("Acme Health"));
        assert_eq!(reloaded.date_of_birth, patient.date_of_birth);
        assert_eq!(reloaded.updated_at, at("2024-03-05 12:00:00"));
    }

    #[test]
    fn order_round_trip() {
        let conn = test_db();
        let org = make_org(&conn, "Valley Ortho", OrgType::Referring);
        let user = make_user(&conn, &org, "ada@valley.test", UserRole::Physician);
        let patient = make_patient(&conn, &org);
        let order = make_order(&conn, "ORD-20240301-AAAAAA", &patient, &org, &user, "2024-03-01 10:00:00");

        let found = get_order(&conn, &order.id).unwrap().unwrap();
        assert_eq!(found, order);
        assert_eq!(found.icd10_code_list(), vec!["S43.431A", "M25.511"]);
        assert!(get_order_by_number(&conn, "ORD-20240301-AAAAAA").unwrap().is_some());
        assert!(order_number_exists(&conn, "ORD-20240301-AAAAAA").unwrap());
        assert!(!order_number_exists(&conn, "ORD-20240301-BBBBBB").unwrap());
    }

    #[test]
    fn orders_visible_to_both_organizations() {
        let conn = test_db();
        let clinic = make_org(&conn, "Valley Ortho", OrgType::Referring);
        let imaging = make_org(&conn, "City Imaging", OrgType::Radiology);
        let elsewhere = make_org(&conn, "Elsewhere", OrgType::Radiology);
        let user = make_user(&conn, &clinic, "ada@valley.test", UserRole::Physician);
        let patient = make_patient(&conn, &clinic);

        let first = make_order(&conn, "ORD-20240301-AAAAAA", &patient, &clinic, &user, "2024-03-01 10:00:00");
        make_order(&conn, "ORD-20240302-BBBBBB", &patient, &clinic, &user, "2024-03-02 10:00:00");
        assign_radiology_organization(&conn, &first.id, &imaging.id, &at("2024-03-03 08:00:00")).unwrap();

        let clinic_view = list_orders_for_organization(&conn, &clinic.id, &OrderFilter::default()).unwrap();
        assert_eq!(clinic_view.len(), 2);
        assert_eq!(clinic_view[0].order_number, "ORD-20240302-BBBBBB");

        let imaging_view = list_orders_for_organization(&conn, &imaging.id, &OrderFilter::default()).unwrap();
        assert_eq!(imaging_view.len(), 1);
        assert_eq!(imaging_view[0].id, first.id);

        assert!(list_orders_for_organization(&conn, &elsewhere.id, &OrderFilter::default())
            .unwrap()
            .is_empty());

        let limited = OrderFilter {
            limit: Some(1),
            ..Default::default()
        };
        assert_eq!(list_orders_for_organization(&conn, &clinic.id, &limited).unwrap().len(), 1);
    }

    #[test]
    fn order_transitions_follow_lifecycle() {
        let conn = test_db();
        let org = make_org(&conn, "Valley Ortho", OrgType::Referring);
        let user = make_user(&conn, &org, "ada@valley.test", UserRole::Physician);
        let patient = make_patient(&conn, &org);
        let order = make_order(&conn, "ORD-20240301-AAAAAA", &patient, &org, &user, "2024-03-01 10:00:00");

        let err = transition_order(
            &conn,
            &order.id,
            OrderStatus::Complete,
            &OrderTransition::default(),
            &at("2024-03-01 11:00:00"),
        )
        .unwrap_err();
        assert!(matches!(err, DatabaseError::InvalidTransition { .. }));

        let signed = transition_order(
            &conn,
            &order.id,
            OrderStatus::PendingPatientInfo,
            &OrderTransition {
                signed_by: Some(user.id),
                signature_name: Some("Ada Jones, MD".into()),
                ..Default::default()
            },
            &at("2024-03-01 11:00:00"),
        )
        .unwrap();
        assert_eq!(signed.status, OrderStatus::PendingPatientInfo);
        assert_eq!(signed.signed_by, Some(user.id));
        assert_eq!(signed.signed_at, Some(at("2024-03-01 11:00:00")));

        let done = transition_order(
            &conn,
            &order.id,
            OrderStatus::Complete,
            &OrderTransition {
                patient_info_completed_by: Some(user.id),
                ..Default::default()
            },
            &at("2024-03-02 09:00:00"),
        )
        .unwrap();
        assert_eq!(done.status, OrderStatus::Complete);
        assert_eq!(done.signed_at, Some(at("2024-03-01 11:00:00")));
        assert_eq!(done.signature_name.as_deref(), Some("Ada Jones, MD"));

        let err = transition_order(
            &conn,
            &order.id,
            OrderStatus::Cancelled,
            &OrderTransition::default(),
            &at("2024-03-03 09:00:00"),
        )
        .unwrap_err();
        assert!(matches!(err, DatabaseError::InvalidTransition { .. }));
    }

    #[test]
    fn transition_unknown_order_is_not_found() {
        let conn = test_db();
        let err = transition_order(
            &conn,
            &Uuid::new_v4(),
            OrderStatus::Cancelled,
            &OrderTransition::default(),
            &utc_now(),
        )
        .unwrap_err();
        assert!(matches!(err, DatabaseError::NotFound { .. }));
    }

    #[test]
    fn relationships_found_in_either_direction() {
        let conn = test_db();
        let clinic = make_org(&conn, "Valley Ortho", OrgType::Referring);
        let imaging = make_org(&conn, "City Imaging", OrgType::Radiology);
        let admin = make_user(&conn, &clinic, "admin@valley.test", UserRole::Admin);
        let rel = OrganizationRelationship {
            id: Uuid::new_v4(),
            organization_id: clinic.id,
            related_organization_id: imaging.id,
            status: RelationshipStatus::Pending,
            initiated_by: admin.id,
            created_at: at("2024-03-01 09:00:00"),
            updated_at: at("2024-03-01 09:00:00"),
        };
        insert_relationship(&conn, &rel).unwrap();

        assert!(find_relationship_between(&conn, &imaging.id, &clinic.id).unwrap().is_some());
        assert!(!has_active_relationship(&conn, &clinic.id, &imaging.id).unwrap());

        update_relationship_status(&conn, &rel.id, RelationshipStatus::Active, &at("2024-03-02 09:00:00"))
            .unwrap();
        assert!(has_active_relationship(&conn, &imaging.id, &clinic.id).unwrap());

        let listed = list_relationships_for_organization(&conn, &imaging.id).unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].counterpart(&imaging.id), clinic.id);
        assert!(get_relationship(&conn, &rel.id).unwrap().unwrap().involves(&clinic.id));
    }

    #[test]
    fn invitation_accepted_once() {
        let conn = test_db();
        let org = make_org(&conn, "Valley Ortho", OrgType::Referring);
        let admin = make_user(&conn, &org, "admin@valley.test", UserRole::Admin);
        let inv = Invitation {
            id: Uuid::new_v4(),
            organization_id: org.id,
            email: "new@valley.test".into(),
            role: UserRole::AdminStaff,
            token_hash: "tokhash".into(),
            invited_by: admin.id,
            created_at: at("2024-03-01 09:00:00"),
            expires_at: at("2024-03-08 09:00:00"),
            accepted_at: None,
        };
        insert_invitation(&conn, &inv).unwrap();

        let found = get_invitation_by_token_hash(&conn, "tokhash").unwrap().unwrap();
        assert!(found.is_open(at("2024-03-02 09:00:00")));
        assert!(!found.is_open(at("2024-03-09 09:00:00")));

        mark_invitation_accepted(&conn, &inv.id, &at("2024-03-02 09:00:00")).unwrap();
        assert!(mark_invitation_accepted(&conn, &inv.id, &at("2024-03-02 09:05:00")).is_err());
        let reloaded = get_invitation_by_token_hash(&conn, "tokhash").unwrap().unwrap();
        assert!(!reloaded.is_open(at("2024-03-02 10:00:00")));
        assert_eq!(list_invitations_by_organization(&conn, &org.id).unwrap().len(), 1);
    }

    #[test]
    fn audit_entries_by_user() {
        let conn = test_db();
        insert_audit_entries(
            &conn,
            &[
                ("2024-03-01 09:00:00".into(), Some("u1".into()), "POST".into(), "/api/orders -> 201".into()),
                ("2024-03-01 09:01:00".into(), Some("u1".into()), "GET".into(), "/api/orders -> 200".into()),
                ("2024-03-01 09:02:00".into(), None, "POST".into(), "/api/auth/login -> 401".into()),
            ],
        )
        .unwrap();
        let entries = query_audit_by_user(&conn, "u1", 10).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].2, "GET");
        assert_eq!(prune_audit_log(&conn, 1).unwrap(), 3);
    }
}
