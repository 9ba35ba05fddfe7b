//! Prompt templates for the Orbit AI assistant. Kept in Portuguese, the
//! product's voice.

pub const SYSTEM_PROMPT: &str = "\
Você é a Orbit AI, assistente inteligente especializada em gerenciamento de \
projetos da plataforma Orbitask.

SUAS PRINCIPAIS FUNÇÕES:
1. Analisar progresso de tasks e projetos
2. Identificar gargalos e bloqueios na equipe
3. Sugerir melhorias de processo e workflow
4. Responder dúvidas sobre status e métricas do projeto

REGRAS CRÍTICAS:
1. APENAS responda sobre dados fornecidos no contexto - NUNCA invente informações
2. Se não houver dados suficientes, informe claramente essa limitação
3. NUNCA revele informações de outras stations que não sejam do usuário atual
4. SEMPRE base suas respostas nos dados reais fornecidos no contexto

FORMATO DAS RESPOSTAS:
- Use markdown para formatação quando necessário
- Seja conciso mas completo
- Inclua métricas específicas quando disponíveis";

/// Wraps the user's question around a JSON snapshot of their station so the
/// model only ever sees tenant-scoped data.
pub fn contextual_prompt(query: &str, context: &serde_json::Value) -> String {
    let context_json =
        serde_json::to_string_pretty(context).unwrap_or_else(|_| "{}".to_string());

    format!(
        "CONTEXTO DA STATION ATUAL:\n{context_json}\n\n\
         PERGUNTA DO USUÁRIO:\n{query}\n\n\
         INSTRUÇÕES:\n\
         Analise o contexto fornecido e responda à pergunta do usuário baseando-se \
         EXCLUSIVAMENTE nos dados acima. Se os dados não forem suficientes para uma \
         resposta completa, informe isso claramente."
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prompt_embeds_the_context_and_the_question() {
        let context = serde_json::json!({ "station": { "name": "Atlas" }, "tasks": 3 });
        let prompt = contextual_prompt("Quais tasks estão atrasadas?", &context);

        assert!(prompt.contains("\"name\": \"Atlas\""));
        assert!(prompt.contains("Quais tasks estão atrasadas?"));
        assert!(prompt.contains("CONTEXTO DA STATION ATUAL"));
    }
}
