//! Borrower-support prompt construction.
//!
//! The reply flow is a two-step prompt: classify the borrower's latest
//! message into one of the prioritized intents below, then generate a short,
//! warm reply following that intent's action rules. The intent table is
//! business policy — edit with care.

use super::GenerateRequest;

/// Mandatory secondary CTA appended to every reply.
pub const WHATSAPP_CTA: &str = "Any query you can whatsapp us on +91 99024 05551.";

/// Fallback salutation when no borrower name is known.
const DEFAULT_BORROWER_NAME: &str = "Valued Borrower";

/// One borrower intent: trigger examples, next-step bullets for the reply,
/// and the single primary CTA to close with.
struct IntentRule {
    name: &'static str,
    examples: &'static [&'static str],
    next_steps: &'static [&'static str],
    primary_cta: &'static str,
}

/// Intents in priority order, highest first. When a message matches several,
/// the highest-priority one wins.
static INTENT_RULES: &[IntentRule] = &[
    IntentRule {
        name: "Already paid",
        examples: &[
            "Borrower says payment is done",
            "Borrower sends screenshot",
            "I already paid",
        ],
        next_steps: &[
            "Thank them warmly.",
            "Ask for payment screenshot + UTR.",
            "Promise verification within 24 hours.",
            "Explain NOC will follow after payment clears. Do NOT mention any timeline for NOC.",
        ],
        primary_cta: "Please share the payment screenshot and UTR so we can verify and update you today.",
    },
    IntentRule {
        name: "Asks for payment link",
        examples: &["Share the link", "Send link", "I want to close now", "Please provide payment link"],
        next_steps: &[
            "Acknowledge their intent.",
            "Tell them the payment link will be requested from lender within 24 hours.",
            "Tell them link will be sent on WhatsApp + email.",
            "Offer a call if they want clarity.",
        ],
        primary_cta: "Please tell me if you'd also like a call when we share the link.",
    },
    IntentRule {
        name: "Provides WhatsApp number",
        examples: &["WhatsApp on", "WhatsApp me on", "My WhatsApp", "WhatsApp number"],
        next_steps: &[
            "Acknowledge their WhatsApp number.",
            "Tell them you will drop a text in 24 hours.",
            "Reassure they will receive the link or information via WhatsApp.",
        ],
        primary_cta: "Sure we will drop you a text in 24 hours.",
    },
    IntentRule {
        name: "Wants a call / wants to discuss",
        examples: &["Call me", "I want to discuss something", "Here is my number", "Please call"],
        next_steps: &[
            "Acknowledge their request.",
            "Ask what would be a good time to call.",
            "Reassure the call will be calm.",
            "Offer WhatsApp chat too.",
        ],
        primary_cta: "What would be a good time to call?",
    },
    IntentRule {
        name: "Committed to pay (no negotiation)",
        examples: &[
            "I will pay",
            "I accept settlement",
            "I want to pay full amount",
            "I want to pay the due amount (not settlement)",
        ],
        next_steps: &[
            "Thank them for confirming.",
            "Tell them link will be requested within 24 hours.",
            "Tell them link will arrive via WhatsApp + email.",
            "Offer optional call.",
        ],
        primary_cta: "Please let me know if you'd like a quick call or if receiving the link on WhatsApp is fine.",
    },
    IntentRule {
        name: "Negotiation mode (asking for reduction)",
        examples: &["Do it for 5000", "Can you reduce more", "This amount is too high"],
        next_steps: &[
            "Acknowledge the requested amount.",
            "Tell them we will check with the lender.",
            "Promise revert within 24 hours.",
            "Ask them to WhatsApp for faster coordination.",
        ],
        primary_cta: "Please WhatsApp us on +91 99024 05551 so we can coordinate this quickly.",
    },
    IntentRule {
        name: "Wants to pay lower amount (counter-offer)",
        examples: &["I can pay X", "I can afford only X", "I propose X"],
        next_steps: &[
            "Acknowledge their amount offer.",
            "Tell them you will check with lender.",
            "Promise a decision within 24 hours.",
            "Inform they will receive updates on WhatsApp + email.",
        ],
        primary_cta: "Please confirm if this is the final amount you want us to check with the lender.",
    },
    IntentRule {
        name: "Extreme financial stress but committed",
        examples: &[
            "Family issues",
            "Unable to manage daily expenses",
            "But still wants to resolve loan",
        ],
        next_steps: &[
            "Respond with deep empathy.",
            "Offer a call with a senior advisor to help plan.",
            "Ask for a realistic timeline they can manage.",
        ],
        primary_cta: "Would you like a senior advisor to speak with you and help plan something manageable?",
    },
    IntentRule {
        name: "Can't pay this month but can pay next month",
        examples: &["Salary delay", "Will pay next month", "Cannot pay this month"],
        next_steps: &[
            "Acknowledge their situation.",
            "Ask for their phone number.",
            "Ask for a realistic date next month.",
        ],
        primary_cta: "Please share your number and a realistic date so we can plan accordingly.",
    },
    IntentRule {
        name: "Needs 1 month time / unclear timeline",
        examples: &["Give me one month", "Not possible now", "I need time but no clear date"],
        next_steps: &[
            "Acknowledge their request.",
            "Ask for exact date after one month.",
            "Show calm reassurance.",
        ],
        primary_cta: "Please let me know the exact date so we can plan the next steps properly.",
    },
    IntentRule {
        name: "Wants partial payment option (some now, rest later)",
        examples: &["I can pay some now", "I cannot commit a date but can pay a part"],
        next_steps: &[
            "Acknowledge their partial-payment intent.",
            "Ask how much they can pay today.",
            "Explain settlement ideally needs one-time payment.",
            "Offer a call.",
        ],
        primary_cta: "Please tell me how much you can pay today so I can guide you properly.",
    },
    IntentRule {
        name: "Wants reduction + more time",
        examples: &["Lower the amount and give me time", "I want both reduction + future date"],
        next_steps: &[
            "Acknowledge their situation.",
            "Ask for their number.",
            "Tell them you will coordinate both amount + timeline with lender.",
            "Promise revert in 24 hours.",
        ],
        primary_cta: "Please share your number so we can coordinate the amount and timeline with the lender.",
    },
    IntentRule {
        name: "Does not know which loan",
        examples: &["Which loan is this?", "I never took this loan", "Please provide loan proof"],
        next_steps: &[
            "Share NBFC name and partner platform.",
            "Share last 4 digits of loan ID if available.",
            "Offer to verify details on call.",
        ],
        primary_cta: "Please let me know if you'd like a call to verify all loan details clearly.",
    },
    IntentRule {
        name: "Thinks Riverline is fraud",
        examples: &["You are fraud", "This is scam", "I won't pay even 1 rupee"],
        next_steps: &[
            "Stay calm and non-defensive.",
            "Share NBFC name and lending partner.",
            "Offer verification steps.",
            "Offer a call for clarity.",
        ],
        primary_cta: "Would you like us to help verify your loan details on a short call?",
    },
    IntentRule {
        name: "Emotional / wants understanding",
        examples: &["Please understand my situation", "I am struggling"],
        next_steps: &[
            "Respond with warmth and empathy.",
            "Offer a supportive call.",
            "Ask for a timeline that feels manageable.",
        ],
        primary_cta: "What timeline feels comfortable for you so we can plan gently around it?",
    },
    IntentRule {
        name: "Needs steps / confused about process",
        examples: &["Explain steps", "What happens next?", "How does settlement work?"],
        next_steps: &[
            "Explain the simple 3-step closure process:",
            "1) Confirm intent",
            "2) Lender shares payment link",
            "3) Payment -> Closure + NOC",
            "Offer a call.",
        ],
        primary_cta: "Would you like a call where we explain everything calmly?",
    },
    IntentRule {
        name: "Wants draft NOC",
        examples: &["Send NOC", "I need closure letter", "Give me proof of closure"],
        next_steps: &[
            "Explain NOC is issued after payment clears.",
            "Do NOT mention any timeline for NOC.",
            "Offer payment link.",
        ],
        primary_cta: "Would you like me to send the payment link so the closure and NOC process can start?",
    },
];

/// System prompt: the support voice and the hard rules every reply obeys.
pub fn build_system_prompt() -> String {
    format!(
        "You are Riverline's empathetic borrower-support assistant. Read ONLY the \
         borrower's latest message in the email thread and respond with warmth, \
         clarity, certainty, and one clear next step. Your goal: help borrowers feel \
         safe, respected, and guided, while ensuring accurate next steps based on \
         their intent. ALWAYS include the secondary CTA: '{WHATSAPP_CTA}' Never \
         mention categories, classification, rules, or internal logic. Never sound \
         legalistic, threatening, or robotic. Always be supportive, calm, and human. \
         Use simple language. Replies must be 3-5 warm lines with a single primary \
         CTA plus the required secondary CTA."
    )
}

/// User prompt: intent classification over the priority-ordered rules, then
/// response generation following the matched rule.
pub fn build_user_prompt(request: &GenerateRequest) -> String {
    let borrower_name = request
        .borrower_name
        .clone()
        .or_else(|| {
            request
                .context
                .get("borrower_name")
                .and_then(|v| v.as_str().map(str::to_string))
        })
        .unwrap_or_else(|| DEFAULT_BORROWER_NAME.to_string());

    let priority_order = INTENT_RULES
        .iter()
        .map(|rule| rule.name)
        .collect::<Vec<_>>()
        .join(", ");

    let category_examples = INTENT_RULES
        .iter()
        .map(|rule| format!("{}: {}", rule.name, rule.examples.join(", ")))
        .collect::<Vec<_>>()
        .join("\n");

    let context_info = format_context(request);
    let action_rules = format_action_rules();

    format!(
        "STEP 1 - INTENT CLASSIFICATION:\n\
         Classify the borrower's LAST message in the email thread into exactly ONE of \
         these intents. Use the priority order below. Even if multiple intents appear, \
         choose the most relevant/highest priority intent.\n\n\
         Priority Order (highest to lowest):\n{priority_order}\n\n\
         Category Examples:\n{category_examples}\n\n\
         Borrower Name: {borrower_name}\n\
         Email Subject: {subject}\n\
         Email Content: {body}{context_info}\n\n\
         STEP 2 - GENERATE RESPONSE:\n\
         Based on the classified intent, generate a response using the EXACT action \
         rules below. The response must be:\n\
         - 3-5 warm, empathetic lines (format next steps as concise bullet points)\n\
         - Always give clear certainty about next steps\n\
         - End with ONE primary CTA from the action rules\n\
         - After the primary CTA, ALWAYS add: \"{WHATSAPP_CTA}\"\n\
         - Do NOT output category names\n\
         - Do NOT mention classification, logic, rules, internal system, or AI\n\
         - Do NOT pressure or sound legalistic\n\
         - NEVER commit any timeline for NOC issuance\n\
         - Use simple language, be supportive, calm, and human\n\n\
         Action Rules:\n{action_rules}\n\n\
         STEP 3 - OUTPUT:\n\
         Output ONLY the email body. No labels, no JSON, no explanations. Just the \
         warm, empathetic reply with certainty (using bullet points for next steps), \
         primary CTA, and WhatsApp CTA.",
        subject = request.subject,
        body = request.email_body,
    )
}

/// Render the free-form context map as "Key: value" lines.
fn format_context(request: &GenerateRequest) -> String {
    let mut lines = Vec::new();
    for (key, value) in &request.context {
        if value.is_null() || key == "borrower_name" {
            continue;
        }
        let title = key
            .split('_')
            .map(|word| {
                let mut chars = word.chars();
                match chars.next() {
                    Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
                    None => String::new(),
                }
            })
            .collect::<Vec<_>>()
            .join(" ");

        let rendered = match value {
            serde_json::Value::Number(n) if n.is_f64() => {
                format!("${:.2}", n.as_f64().unwrap_or_default())
            }
            serde_json::Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        lines.push(format!("{title}: {rendered}"));
    }
    if lines.is_empty() {
        String::new()
    } else {
        lines.sort();
        format!("\n\nAdditional Context:\n{}", lines.join("\n"))
    }
}

fn format_action_rules() -> String {
    let mut formatted = Vec::new();
    for rule in INTENT_RULES {
        formatted.push(format!("\n{}:", rule.name));
        formatted.push("  Next Steps (format as bullet points in response):".to_string());
        for step in rule.next_steps {
            formatted.push(format!("    - {step}"));
        }
        formatted.push(format!("  Primary CTA: {}", rule.primary_cta));
    }
    formatted.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> GenerateRequest {
        GenerateRequest {
            email_body: "I already paid last week, please check".into(),
            subject: "Loan settlement".into(),
            borrower_name: None,
            context: Default::default(),
        }
    }

    #[test]
    fn system_prompt_carries_whatsapp_cta() {
        assert!(build_system_prompt().contains(WHATSAPP_CTA));
    }

    #[test]
    fn user_prompt_includes_message_and_intents() {
        let prompt = build_user_prompt(&request());
        assert!(prompt.contains("I already paid last week"));
        assert!(prompt.contains("Loan settlement"));
        assert!(prompt.contains("Already paid"));
        assert!(prompt.contains("Wants draft NOC"));
        assert!(prompt.contains(WHATSAPP_CTA));
    }

    #[test]
    fn borrower_name_falls_back_to_generic() {
        let prompt = build_user_prompt(&request());
        assert!(prompt.contains("Borrower Name: Valued Borrower"));
    }

    #[test]
    fn borrower_name_from_context() {
        let mut req = request();
        req.context.insert(
            "borrower_name".into(),
            serde_json::Value::String("Asha".into()),
        );
        let prompt = build_user_prompt(&req);
        assert!(prompt.contains("Borrower Name: Asha"));
        // The name key itself must not leak into the context block.
        assert!(!prompt.contains("Additional Context"));
    }

    #[test]
    fn context_lines_are_rendered() {
        let mut req = request();
        req.context.insert(
            "loan_amount".into(),
            serde_json::Value::from(6500.0_f64),
        );
        req.context.insert(
            "due_date".into(),
            serde_json::Value::String("2026-09-01".into()),
        );
        let prompt = build_user_prompt(&req);
        assert!(prompt.contains("Additional Context:"));
        assert!(prompt.contains("Loan Amount: $6500.00"));
        assert!(prompt.contains("Due Date: 2026-09-01"));
    }
}
