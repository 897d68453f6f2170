//! Esquema Diesel (mantenido a mano). Reemplazable con `diesel print-schema`.

diesel::table! {
    proofs (job_id) {
        job_id -> Text,
        manifest_digest -> Text,
        status -> Text,
        verified -> Bool,
        tsa_timestamp -> Nullable<Jsonb>,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}
