//! User-facing status text

use crate::config::MessageStyle;
use crate::error::{Error, ErrorKind};

/// Invitations rotated while idle
pub const IDLE_PHRASES: &[&str] = &[
    "Diga 'Inocêncio' para me acordar!",
    "Estou aqui para ajudar! Me chame pelo nome.",
    "Pronto para conversar quando você quiser!",
    "Aguardando seu comando... Diga meu nome!",
    "Inocêncio dormindo... Me acorde quando precisar!",
];

/// Builds status lines for the presenter
#[derive(Debug, Clone)]
pub struct Messages {
    style: MessageStyle,
    wake_display: String,
}

impl Messages {
    /// Create messages that tell the user to say `wake_display`
    #[must_use]
    pub fn new(style: MessageStyle, wake_display: impl Into<String>) -> Self {
        Self {
            style,
            wake_display: wake_display.into(),
        }
    }

    /// Shown once at startup
    #[must_use]
    pub fn system_ready(&self) -> String {
        format!("SISTEMA PRONTO - Diga '{}'", self.wake_display)
    }

    /// Wake-word detection is live
    #[must_use]
    pub fn listening_for_wake(&self) -> String {
        format!("ESCUTANDO - Diga '{}'", self.wake_display)
    }

    /// Capturing the question
    #[must_use]
    pub fn hearing_question(&self) -> String {
        "OUVINDO SUA PERGUNTA...".to_string()
    }

    /// Question sent, waiting for the answer
    #[must_use]
    pub fn processing(&self) -> String {
        "PROCESSANDO...".to_string()
    }

    /// Playing the answer
    #[must_use]
    pub fn speaking(&self) -> String {
        "RESPONDENDO...".to_string()
    }

    /// Answer finished
    #[must_use]
    pub fn ready_again(&self) -> String {
        format!("PRONTO - Diga '{}'", self.wake_display)
    }

    /// Leaving the error phase
    #[must_use]
    pub fn recovering(&self) -> String {
        "RECUPERANDO...".to_string()
    }

    /// Invitation to try again after a discarded question
    ///
    /// Unlike [`Self::error`] this never mentions an error phase, since the
    /// session goes straight back to hibernation.
    #[must_use]
    pub fn retry(&self, error: &Error) -> String {
        match self.style {
            MessageStyle::Technical => format!("{} ({error})", friendly(error.kind())),
            MessageStyle::Friendly => friendly(error.kind()).to_string(),
        }
    }

    /// Wake word heard while busy
    #[must_use]
    pub fn busy_hint(&self) -> String {
        "Um momento, ainda estou atendendo...".to_string()
    }

    /// Fatal error that needs the `recover` command
    #[must_use]
    pub fn needs_attention(&self) -> String {
        "Preciso de ajuda: verifique o microfone e use 'recover'".to_string()
    }

    /// Status line for a failure
    #[must_use]
    pub fn error(&self, error: &Error) -> String {
        match self.style {
            MessageStyle::Technical => format!("ERRO - {error}"),
            MessageStyle::Friendly => format!("ERRO - {}", friendly(error.kind())),
        }
    }
}

fn friendly(kind: ErrorKind) -> &'static str {
    match kind {
        ErrorKind::Permission => "Permissão de microfone necessária",
        ErrorKind::Initialization => "Reconhecimento de voz indisponível",
        ErrorKind::Recognition => "Não entendi, vamos tentar de novo",
        ErrorKind::Network => "Sem conexão com o servidor",
        ErrorKind::Api => "O servidor não conseguiu responder",
        ErrorKind::Playback => "Não consegui reproduzir a resposta",
        ErrorKind::TooShort => "Pergunta muito curta. Tente de novo!",
        ErrorKind::NoAudio => "Não consegui ouvir. Pode repetir?",
        ErrorKind::Audio => "Erro na captura de áudio",
        ErrorKind::Config => "Configuração inválida",
    }
}
