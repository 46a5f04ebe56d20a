//! Internationalization (i18n) module.
//!
//! Provides localized strings for attachment states, toasts and CLI output.
//! English is the default language; Spanish is available as an alternative.

use std::sync::OnceLock;

static CURRENT_LANG: OnceLock<Lang> = OnceLock::new();

/// Supported languages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lang {
    /// English (default)
    En,
    /// Spanish
    Es,
}

impl Lang {
    /// Parse a language code string (e.g. "en", "es", "en_US", "es_ES").
    /// Returns `None` for unrecognized codes.
    pub fn from_code(code: &str) -> Option<Self> {
        let normalized = code.to_lowercase();
        let prefix = normalized.split(['_', '-']).next().unwrap_or("");
        match prefix {
            "en" => Some(Self::En),
            "es" => Some(Self::Es),
            _ => None,
        }
    }

    /// Return the ISO 639-1 code for this language.
    pub fn code(self) -> &'static str {
        match self {
            Self::En => "en",
            Self::Es => "es",
        }
    }
}

/// Initialize the global language. Call once at startup.
/// If already initialized, this is a no-op.
pub fn set_lang(lang: Lang) {
    let _ = CURRENT_LANG.set(lang);
}

/// Get the currently configured language (defaults to English).
pub fn lang() -> Lang {
    CURRENT_LANG.get().copied().unwrap_or(Lang::En)
}

/// Detect language from `MAILATTACH_LANG`, then `LC_MESSAGES` / `LANG`.
pub fn detect_system_lang() -> Lang {
    std::env::var("MAILATTACH_LANG")
        .ok()
        .and_then(|v| Lang::from_code(&v))
        .or_else(|| {
            std::env::var("LC_MESSAGES")
                .ok()
                .and_then(|v| Lang::from_code(&v))
        })
        .or_else(|| std::env::var("LANG").ok().and_then(|v| Lang::from_code(&v)))
        .unwrap_or(Lang::En)
}

/// Macro for defining translatable message functions.
/// Each function returns a `&'static str` based on the current language.
macro_rules! msg {
    ($name:ident, $en:expr, $es:expr) => {
        /// Returns a localized string for the current language.
        pub fn $name() -> &'static str {
            match lang() {
                Lang::En => $en,
                Lang::Es => $es,
            }
        }
    };
}

// ── General ──────────────────────────────────────────────────────

msg!(app_name, "mailattach", "mailattach");
msg!(
    app_about,
    "mailattach \u{2014} attachment lifecycle for encrypted mail: validate, encrypt, fetch, decrypt, package and preview.",
    "mailattach \u{2014} ciclo de vida de adjuntos para correo cifrado: validar, cifrar, descargar, descifrar, empaquetar y previsualizar."
);
msg!(
    app_long_about,
    "mailattach \u{2014} attachment lifecycle for encrypted mail.\nValidates uploads against size and type policy, encrypts them with\nper-attachment session keys, fetches and decrypts them with bounded\nconcurrency, and packages downloads as single files or zip archives.",
    "mailattach \u{2014} ciclo de vida de adjuntos para correo cifrado.\nValida subidas seg\u{fa}n tama\u{f1}o y tipo, las cifra con claves de sesi\u{f3}n\npor adjunto, las descarga y descifra con concurrencia acotada, y empaqueta\nlas descargas como ficheros sueltos o archivos zip."
);
msg!(
    app_after_help,
    "Configuration: $MAILATTACH_CONFIG or ~/.config/mailattach/config.toml",
    "Configuraci\u{f3}n: $MAILATTACH_CONFIG o ~/.config/mailattach/config.toml"
);

// ── CLI help strings ─────────────────────────────────────────────

msg!(
    help_cmd_inspect,
    "Check files against the upload policy and show their preview renderer",
    "Comprobar ficheros con la pol\u{ed}tica de subida y mostrar su visor"
);
msg!(
    help_cmd_encrypt,
    "Upload files: validate, encrypt and register them in a manifest",
    "Subir ficheros: validar, cifrar y registrarlos en un manifiesto"
);
msg!(
    help_cmd_fetch,
    "Fetch and decrypt attachments listed in a manifest",
    "Descargar y descifrar los adjuntos de un manifiesto"
);
msg!(
    help_cmd_download,
    "Save attachments as a single file or a zip archive",
    "Guardar adjuntos como fichero suelto o archivo zip"
);
msg!(
    help_cmd_list,
    "List the attachments of an .eml message",
    "Listar los adjuntos de un mensaje .eml"
);
msg!(
    help_cmd_preview,
    "Hand a file to the native preview bridge",
    "Enviar un fichero al puente nativo de previsualizaci\u{f3}n"
);
msg!(
    help_cmd_completions,
    "Generate shell completions",
    "Generar autocompletado para la shell"
);
msg!(help_cmd_manpage, "Generate a man page", "Generar p\u{e1}gina de manual");

// ── Attachment errors (state messages and toasts) ───────────────

msg!(
    err_file_type_not_supported,
    "File type not supported",
    "Tipo de fichero no admitido"
);
msg!(
    err_inline_svg,
    "SVG images cannot be inserted inline",
    "Las im\u{e1}genes SVG no se pueden insertar en l\u{ed}nea"
);
msg!(
    err_too_large,
    "Attachment too large",
    "Adjunto demasiado grande"
);
msg!(
    err_read_failed,
    "Could not read file",
    "No se pudo leer el fichero"
);
msg!(
    err_failed_decrypting,
    "Failed decrypting attachment",
    "Error al descifrar el adjunto"
);
msg!(
    err_failed_fetching,
    "Failed to fetch attachment",
    "Error al descargar el adjunto"
);
msg!(err_cancelled, "Cancelled", "Cancelado");
msg!(
    err_file_not_found,
    "File not found",
    "Fichero no encontrado"
);

// ── Toast titles ─────────────────────────────────────────────────

msg!(
    toast_fetch_failed,
    "Could not load attachments",
    "No se pudieron cargar los adjuntos"
);
msg!(
    toast_download_failed,
    "Could not download attachment",
    "No se pudo descargar el adjunto"
);
msg!(
    toast_upload_rejected,
    "Could not attach file",
    "No se pudo adjuntar el fichero"
);

// ── CLI strings ─────────────────────────────────────────────────

msg!(cli_reading, "Reading", "Leyendo");
msg!(cli_fetching, "Fetching", "Descargando");
msg!(cli_downloading, "Downloading", "Descargando");
msg!(cli_col_name, "Name", "Nombre");
msg!(cli_col_type, "Type", "Tipo");
msg!(cli_col_size, "Size", "Tama\u{f1}o");
msg!(cli_col_state, "State", "Estado");
msg!(cli_col_renderer, "Renderer", "Visor");
msg!(cli_col_category, "Category", "Categor\u{ed}a");
msg!(cli_ok, "ok", "ok");
msg!(cli_encrypted, "Encrypted", "Cifrado(s)");
msg!(cli_file_s_into, "file(s) into", "fichero(s) en");
msg!(cli_fetched, "Fetched", "Descargado(s)");
msg!(cli_from_cache, "from cache", "desde cach\u{e9}");
msg!(cli_failed, "failed", "con error");
msg!(cli_saved, "Saved", "Guardado");
msg!(
    cli_sent_to_bridge,
    "Sent to native bridge",
    "Enviado al puente nativo"
);
msg!(
    cli_no_attachments,
    "No attachments found.",
    "No se encontraron adjuntos."
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lang_from_code() {
        assert_eq!(Lang::from_code("en"), Some(Lang::En));
        assert_eq!(Lang::from_code("es"), Some(Lang::Es));
        assert_eq!(Lang::from_code("en_US"), Some(Lang::En));
        assert_eq!(Lang::from_code("es-MX"), Some(Lang::Es));
        assert_eq!(Lang::from_code("fr"), None);
    }

    #[test]
    fn test_lang_code_roundtrip() {
        assert_eq!(Lang::En.code(), "en");
        assert_eq!(Lang::Es.code(), "es");
    }

    #[test]
    fn test_messages_return_strings() {
        assert!(!app_name().is_empty());
        assert!(!err_file_type_not_supported().is_empty());
        assert!(!toast_fetch_failed().is_empty());
    }
}
