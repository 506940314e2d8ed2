//! Groups search hits that describe the same person or company.
//!
//! Hits are keyed by normalized cedula, then by email, then kept on their
//! own under the document id. Only values actually present in the stored records end up in a
//! profile.
use crate::db_storage::CEDULA_FIELDS;
use crate::models::{Profile, SearchHit};
use crate::normalization::{
    classify_cedula, is_valid_email, normalize_cedula, validate_cr_phone, CedulaKind,
};
use serde_json::Value;

const NAME_FIELDS: &[&str] = &[
    "nombre_completo",
    "nombre",
    "razon_social",
    "nombre_comercial",
    "full_name",
];
const EMAIL_FIELDS: &[&str] = &["email", "correo"];
const PHONE_FIELDS: &[&str] = &["telefono", "telefono_movil", "celular"];
const ADDRESS_FIELDS: &[&str] = &["direccion", "direccion_exacta"];

fn string_field<'a>(data: &'a Value, field: &str) -> Option<&'a str> {
    data.get(field)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

fn push_unique(list: &mut Vec<String>, value: String) {
    if !list.iter().any(|v| v.eq_ignore_ascii_case(&value)) {
        list.push(value);
    }
}

/// Grouping key for a hit: `cedula`, `email:<addr>`, or `registro:<_id>`.
///
/// The cedula kind is only reported for keys taken from a cedula field.
/// Hits without `_id` fall back to their position in the result list.
pub fn profile_key(hit: &SearchHit, position: usize) -> (String, Option<CedulaKind>) {
    if let Some(cedula) = CEDULA_FIELDS
        .iter()
        .find_map(|field| string_field(&hit.data, field))
    {
        return (normalize_cedula(cedula), classify_cedula(cedula));
    }
    if let Some(email) = EMAIL_FIELDS
        .iter()
        .find_map(|field| string_field(&hit.data, field))
    {
        return (format!("email:{}", email.to_lowercase()), None);
    }
    match string_field(&hit.data, "_id") {
        Some(id) => (format!("registro:{}", id), None),
        None => (format!("registro:{}", position), None),
    }
}

/// Merges hits into profiles, in order of first appearance.
pub fn fuse_profiles(hits: &[SearchHit]) -> Vec<Profile> {
    let mut profiles: Vec<Profile> = Vec::new();

    for (position, hit) in hits.iter().enumerate() {
        let (key, tipo_cedula) = profile_key(hit, position);
        let idx = match profiles.iter().position(|p| p.cedula == key) {
            Some(idx) => idx,
            None => {
                profiles.push(Profile {
                    tipo_cedula,
                    cedula: key,
                    cedula_verificada: false,
                    fuentes: Vec::new(),
                    total_fuentes: 0,
                    nombres: Vec::new(),
                    emails: Vec::new(),
                    telefonos: Vec::new(),
                    direcciones: Vec::new(),
                    registros: Vec::new(),
                });
                profiles.len() - 1
            }
        };
        let profile = &mut profiles[idx];

        if !profile.fuentes.contains(&hit.coleccion) {
            profile.fuentes.push(hit.coleccion.clone());
        }

        for field in NAME_FIELDS {
            if let Some(name) = string_field(&hit.data, field) {
                push_unique(&mut profile.nombres, name.to_string());
            }
        }
        if profile.nombres.is_empty() {
            let composed: Vec<&str> = ["primer_nombre", "primer_apellido", "segundo_apellido"]
                .iter()
                .filter_map(|f| string_field(&hit.data, f))
                .collect();
            if !composed.is_empty() {
                push_unique(&mut profile.nombres, composed.join(" "));
            }
        }

        for field in EMAIL_FIELDS {
            if let Some(email) = string_field(&hit.data, field) {
                if is_valid_email(email) {
                    push_unique(&mut profile.emails, email.to_lowercase());
                }
            }
        }

        for field in PHONE_FIELDS {
            if let Some(phone) = string_field(&hit.data, field) {
                let (valid, normalized) = validate_cr_phone(phone);
                push_unique(
                    &mut profile.telefonos,
                    if valid { normalized } else { phone.to_string() },
                );
            }
        }

        let mut address_parts: Vec<&str> = ADDRESS_FIELDS
            .iter()
            .filter_map(|f| string_field(&hit.data, f))
            .collect();
        for f in ["distrito", "canton", "provincia"] {
            if let Some(part) = string_field(&hit.data, f) {
                address_parts.push(part);
            }
        }
        if !address_parts.is_empty() {
            push_unique(&mut profile.direcciones, address_parts.join(", "));
        }

        profile.registros.push(hit.clone());
    }

    for profile in &mut profiles {
        profile.total_fuentes = profile.fuentes.len();
        profile.cedula_verificada = profile.total_fuentes > 1;
    }

    profiles
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::search::tag_hit;
    use serde_json::json;

    #[test]
    fn merges_same_cedula_across_collections() {
        let hits = vec![
            tag_hit(
                "personas_fisicas",
                json!({"cedula": "1-2345-6789", "nombre": "Maria Jimenez", "telefono": "8888-7777"}),
            ),
            tag_hit(
                "tse_datos_hibridos",
                json!({"cedula": "123456789", "nombre_completo": "MARIA JIMENEZ LOPEZ", "provincia": "Alajuela"}),
            ),
            tag_hit(
                "personas_juridicas",
                json!({"cedula_juridica": "3-101-234567", "razon_social": "Comercial Santa Fe S.A."}),
            ),
        ];

        let profiles = fuse_profiles(&hits);
        assert_eq!(profiles.len(), 2);

        let maria = &profiles[0];
        assert_eq!(maria.cedula, "1-2345-6789");
        assert!(maria.cedula_verificada);
        assert_eq!(maria.total_fuentes, 2);
        assert_eq!(maria.nombres, vec!["Maria Jimenez", "MARIA JIMENEZ LOPEZ"]);
        assert_eq!(maria.telefonos, vec!["+50688887777"]);
        assert_eq!(maria.direcciones, vec!["Alajuela"]);
        assert_eq!(maria.registros.len(), 2);

        let empresa = &profiles[1];
        assert_eq!(empresa.cedula, "3-101-234567");
        assert!(!empresa.cedula_verificada);
        assert_eq!(
            empresa.tipo_cedula,
            Some(CedulaKind::Juridica)
        );
    }

    #[test]
    fn falls_back_to_email_then_position() {
        let hits = vec![
            tag_hit("a", json!({"email": "Info@SantaFe.co.cr"})),
            tag_hit("b", json!({"email": "info@santafe.co.cr", "nombre": "Santa Fe"})),
            tag_hit("c", json!({"nombre": "Sin identificacion"})),
        ];
        let profiles = fuse_profiles(&hits);
        assert_eq!(profiles.len(), 2);
        assert_eq!(profiles[0].cedula, "email:info@santafe.co.cr");
        assert_eq!(profiles[0].emails, vec!["info@santafe.co.cr"]);
        assert_eq!(profiles[1].cedula, "registro:2");
        assert_eq!(profiles[1].tipo_cedula, None);
    }

    #[test]
    fn composes_name_from_parts() {
        let hits = vec![tag_hit(
            "personas_fisicas",
            json!({"cedula": "2-5678-9012", "primer_nombre": "Jose", "primer_apellido": "Gonzalez"}),
        )];
        let profiles = fuse_profiles(&hits);
        assert_eq!(profiles[0].nombres, vec!["Jose Gonzalez"]);
    }

    #[test]
    fn email_key_with_digits_has_no_cedula_kind() {
        let hits = vec![tag_hit(
            "personas_fisicas",
            json!({"email": "ana123456789@correo.cr", "nombre": "Ana"}),
        )];
        let profiles = fuse_profiles(&hits);
        assert_eq!(profiles[0].cedula, "email:ana123456789@correo.cr");
        assert_eq!(profiles[0].tipo_cedula, None);
    }

    #[test]
    fn unidentified_hits_are_keyed_by_document_id() {
        let hits = vec![
            tag_hit(
                "personas_fisicas",
                json!({"_id": "7f1c2a9e-0000-4000-8000-000000000001", "nombre": "Sin cedula"}),
            ),
            tag_hit(
                "tse_datos_hibridos",
                json!({"_id": "7f1c2a9e-0000-4000-8000-000000000002", "nombre": "Otro registro"}),
            ),
        ];
        let profiles = fuse_profiles(&hits);
        assert_eq!(profiles.len(), 2);
        assert_eq!(
            profiles[0].cedula,
            "registro:7f1c2a9e-0000-4000-8000-000000000001"
        );
        assert_eq!(profiles[0].tipo_cedula, None);
        assert_eq!(
            profiles[1].cedula,
            "registro:7f1c2a9e-0000-4000-8000-000000000002"
        );
    }
}
