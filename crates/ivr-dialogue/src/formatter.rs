//! Response Formatter: renders a resolved path into the spoken step trace.
//!
//! Rendering is template-driven per language. Each language owns its own
//! sentence table; both consume the same [`ResolvedPath`]. Every rendered
//! path response is vetted by the [`SecurityGuard`] before it is returned.

use crate::error::FormatError;
use ivr_menu::{MenuNode, MenuTree};
use ivr_policy::{SecurityGuard, Verdict};
use ivr_resolver::ResolvedPath;
use ivr_types::{Language, NodeKind};
use serde::Serialize;
use std::sync::Arc;

/// A response ready for speech synthesis.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RenderedResponse {
    pub language: Language,
    /// Independently deliverable sentences, spoken in order. Barge-in drops
    /// whatever has not been delivered yet.
    pub segments: Vec<String>,
    /// All segments joined.
    pub text: String,
    /// Number of selections in the step trace.
    pub steps: usize,
    /// Guard intervention label when the text was masked.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub guard_intervention: Option<&'static str>,
}

impl RenderedResponse {
    pub fn new(language: Language, segments: Vec<String>, steps: usize) -> Self {
        let text = segments.join(" ");
        Self {
            language,
            segments,
            text,
            steps,
            guard_intervention: None,
        }
    }
}

struct Templates {
    acknowledge: &'static str,
    languages: &'static str,
    step: &'static str,
    option: &'static str,
    option_separator: &'static str,
    option_last: &'static str,
    final_auth: &'static str,
    final_leaf: &'static str,
    final_menu: &'static str,
    footer_return: &'static str,
    footer_timeout: &'static str,
    footer_offer: &'static str,
    greeting: &'static [&'static str],
    reprompt: &'static str,
    timeout_prompt: &'static str,
    fallback: &'static str,
    transfer: &'static str,
}

const ENGLISH: Templates = Templates {
    acknowledge: "Sure, I can help you with that. Here is how to get there in the phone menu.",
    languages: "We support: {options}. Which language would you like?",
    step: "Step {n}: press {selector} for {label}.",
    option: "press {selector} for {label}",
    option_separator: ", ",
    option_last: " or ",
    final_auth: "Final Step: have the following ready: {auth}.",
    final_leaf: "Final Step: you will be connected to {label}.",
    final_menu: "Final Step: choose one of these options: {options}.",
    footer_return: "Press {return} to go back to the previous menu, or * to repeat it.",
    footer_timeout: "Each menu waits {timeout} for your input.",
    footer_offer: "Is there anything else I can help you find?",
    greeting: &[
        "Hello, I am your phone menu guide. You can interrupt me at any time.",
        "Tell me what you need, for example \"I lost my credit card\" or \"I want my account balance\", and I will tell you exactly which options to press.",
    ],
    reprompt: "Sorry, I did not catch that. Could you tell me again what you need? You can also press 0 to reach an agent.",
    timeout_prompt: "I did not hear anything. Tell me what you need, or press 0 to reach an agent.",
    fallback: "I'll connect you to the main menu where you can say or press your option.",
    transfer: "I am transferring you to an agent now. Please stay on the line.",
};

const SPANISH: Templates = Templates {
    acknowledge: "Claro, con gusto le ayudo. Así se llega en el menú telefónico.",
    languages: "Atendemos en: {options}. ¿Qué idioma prefiere?",
    step: "Paso {n}: presione {selector} para {label}.",
    option: "presione {selector} para {label}",
    option_separator: ", ",
    option_last: " o ",
    final_auth: "Paso final: tenga a mano lo siguiente: {auth}.",
    final_leaf: "Paso final: será atendido en {label}.",
    final_menu: "Paso final: elija una de estas opciones: {options}.",
    footer_return: "Presione {return} para volver al menú anterior, o * para repetirlo.",
    footer_timeout: "Cada menú espera {timeout} su respuesta.",
    footer_offer: "¿Hay algo más que pueda ayudarle a encontrar?",
    greeting: &[
        "Hola, soy su guía del menú telefónico. Puede interrumpirme en cualquier momento.",
        "Dígame qué necesita, por ejemplo \"perdí mi tarjeta\" o \"quiero consultar mi saldo\", y le diré exactamente qué opciones marcar.",
    ],
    reprompt: "Disculpe, no le entendí. ¿Podría repetirme qué necesita? También puede presionar 0 para hablar con un agente.",
    timeout_prompt: "No escuché nada. Dígame qué necesita, o presione 0 para hablar con un agente.",
    fallback: "Le conectaré con el menú principal, donde puede decir o marcar su opción.",
    transfer: "Le estoy transfiriendo con un agente. Por favor, no cuelgue.",
};

fn templates(language: Language) -> &'static Templates {
    match language {
        Language::English => &ENGLISH,
        Language::Spanish => &SPANISH,
    }
}

/// Renders resolved paths and the fixed system utterances.
#[derive(Debug)]
pub struct ResponseFormatter {
    tree: Arc<MenuTree>,
    guard: Arc<SecurityGuard>,
}

impl ResponseFormatter {
    pub fn new(tree: Arc<MenuTree>, guard: Arc<SecurityGuard>) -> Self {
        Self { tree, guard }
    }

    /// Renders the step trace for `path` in `language` and vets it.
    ///
    /// # Errors
    ///
    /// Returns [`FormatError::Blocked`] if the guard vetoes the text.
    pub fn format(
        &self,
        path: &ResolvedPath<'_>,
        language: Language,
    ) -> Result<RenderedResponse, FormatError> {
        let t = templates(language);
        let target = path.target();
        let steps = path.steps();

        let mut segments = Vec::with_capacity(steps.len() + 5);
        if target.kind == NodeKind::LanguageSelect {
            segments.push(t.languages.replace("{options}", &self.options(target, t)?));
        } else {
            segments.push(t.acknowledge.to_string());
            for (index, node) in steps.iter().enumerate() {
                segments.push(
                    t.step
                        .replace("{n}", &(index + 1).to_string())
                        .replace("{selector}", node.selector.as_deref().unwrap_or_default())
                        .replace("{label}", &node.label),
                );
            }
            segments.push(match path.terminal_auth_requirement {
                Some(auth) => t.final_auth.replace("{auth}", &auth.description),
                None if target.kind.is_selection_point() => {
                    t.final_menu.replace("{options}", &self.options(target, t)?)
                }
                None => t.final_leaf.replace("{label}", &target.label),
            });
        }
        segments.extend(self.footer(language));

        let response = RenderedResponse::new(language, segments, steps.len());
        match self.guard.check(&response.text, target, steps.len()) {
            Verdict::Allowed => Ok(response),
            Verdict::Redact { reason, .. } => {
                let masked = response
                    .segments
                    .iter()
                    .map(|segment| self.guard.redact(segment).0)
                    .collect();
                let mut response = RenderedResponse::new(language, masked, steps.len());
                response.guard_intervention = Some(reason.label());
                Ok(response)
            }
            Verdict::Block(reason) => Err(FormatError::Blocked(reason)),
        }
    }

    pub fn greeting(&self, language: Language) -> RenderedResponse {
        let segments = templates(language)
            .greeting
            .iter()
            .map(|s| s.to_string())
            .collect();
        RenderedResponse::new(language, segments, 0)
    }

    /// Spoken after a turn that did not resolve.
    pub fn reprompt(&self, language: Language) -> RenderedResponse {
        fixed(language, templates(language).reprompt)
    }

    /// Spoken after the caller stays silent through the listen timeout.
    pub fn timeout_prompt(&self, language: Language) -> RenderedResponse {
        fixed(language, templates(language).timeout_prompt)
    }

    /// Substituted for a response the guard blocked.
    pub fn fallback(&self, language: Language) -> RenderedResponse {
        fixed(language, templates(language).fallback)
    }

    /// Spoken before handing the caller to a human agent.
    pub fn transfer(&self, language: Language) -> RenderedResponse {
        fixed(language, templates(language).transfer)
    }

    fn options(&self, menu: &MenuNode, t: &Templates) -> Result<String, FormatError> {
        let options: Vec<String> = self
            .tree
            .children_of(&menu.id)?
            .into_iter()
            .filter(|child| !child.kind.is_control())
            .map(|child| {
                t.option
                    .replace("{selector}", child.selector.as_deref().unwrap_or_default())
                    .replace("{label}", &child.label)
            })
            .collect();
        Ok(match options.split_last() {
            None => String::new(),
            Some((last, [])) => last.clone(),
            Some((last, rest)) => format!(
                "{}{}{}",
                rest.join(t.option_separator),
                t.option_last,
                last
            ),
        })
    }

    fn footer(&self, language: Language) -> [String; 3] {
        let t = templates(language);
        let notices = self.tree.notices();
        [
            t.footer_return.replace("{return}", &notices.return_marker),
            t.footer_timeout
                .replace("{timeout}", notices.timeout_marker(language).unwrap_or_default()),
            t.footer_offer.to_string(),
        ]
    }
}

fn fixed(language: Language, text: &str) -> RenderedResponse {
    RenderedResponse::new(language, vec![text.to_string()], 0)
}
