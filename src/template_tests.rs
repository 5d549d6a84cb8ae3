// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Unit tests for `template.rs`

#[cfg(test)]
mod tests {
    use crate::constants::DEFAULT_NAME_TEMPLATE;
    use crate::errors::TemplateError;
    use crate::service::ServiceDescriptor;
    use crate::template::Template;

    fn web_service() -> ServiceDescriptor {
        ServiceDescriptor::new("prod", "web")
            .with_label("app", "storefront")
            .with_label("app.kubernetes.io/part-of", "shop")
            .with_port(80)
    }

    fn render(text: &str) -> Result<String, TemplateError> {
        Template::parse(text)?.render(&web_service())
    }

    // =====================================================
    // Rendering
    // =====================================================

    #[test]
    fn test_default_template() {
        assert_eq!(render(DEFAULT_NAME_TEMPLATE).unwrap(), "web.svc.prod");
    }

    #[test]
    fn test_plain_text_template() {
        assert_eq!(render("static-name").unwrap(), "static-name");
    }

    #[test]
    fn test_label_field_path() {
        assert_eq!(
            render("{{.Service.Labels.app}}.{{.Service.Namespace}}").unwrap(),
            "storefront.prod"
        );
    }

    #[test]
    fn test_label_method() {
        assert_eq!(
            render(r#"{{.Label "app.kubernetes.io/part-of"}}-{{.Service.Name}}"#).unwrap(),
            "shop-web"
        );
    }

    #[test]
    fn test_index_function() {
        assert_eq!(
            render(r#"{{index .Service.Labels "app"}}.apps"#).unwrap(),
            "storefront.apps"
        );
    }

    #[test]
    fn test_raw_string_argument() {
        assert_eq!(render("{{.Label `app`}}").unwrap(), "storefront");
    }

    #[test]
    fn test_string_constant_renders_as_text() {
        assert_eq!(
            render(r#"{{.Service.Name}}{{"-"}}{{.Service.Namespace}}"#).unwrap(),
            "web-prod"
        );
        assert_eq!(render("{{`static`}}.{{.Service.Name}}").unwrap(), "static.web");
        assert_eq!(render(r#"a{{""}}b"#).unwrap(), "ab");
    }

    #[test]
    fn test_missing_label_renders_empty() {
        assert_eq!(render(r#"x{{.Label "missing"}}y"#).unwrap(), "xy");
        assert_eq!(render("x{{.Service.Labels.missing}}y").unwrap(), "xy");
        assert_eq!(render(r#"x{{index .Service.Labels "missing"}}y"#).unwrap(), "xy");
    }

    #[test]
    fn test_whitespace_inside_action() {
        assert_eq!(
            render("{{ .Service.Name }}.{{   .Service.Namespace\t}}").unwrap(),
            "web.prod"
        );
    }

    #[test]
    fn test_trim_markers() {
        assert_eq!(
            render("  {{- .Service.Name -}}  .  {{- .Service.Namespace }}").unwrap(),
            "web.prod"
        );
    }

    #[test]
    fn test_render_is_pure() {
        let template = Template::parse(DEFAULT_NAME_TEMPLATE).unwrap();
        let service = web_service();

        let first = template.render(&service).unwrap();
        let second = template.render(&service).unwrap();

        assert_eq!(first, second);
    }

    #[test]
    fn test_source_and_display() {
        let template: Template = DEFAULT_NAME_TEMPLATE.parse().unwrap();
        assert_eq!(template.source(), DEFAULT_NAME_TEMPLATE);
        assert_eq!(template.to_string(), DEFAULT_NAME_TEMPLATE);
    }

    // =====================================================
    // Render-time errors
    // =====================================================

    #[test]
    fn test_undefined_field_fails_at_render() {
        let template = Template::parse("{{.Service.Foo}}").expect("unknown fields parse");

        assert_eq!(
            template.render(&web_service()),
            Err(TemplateError::UndefinedField {
                field: ".Service.Foo".to_string()
            })
        );
    }

    #[test]
    fn test_label_without_argument_fails_at_render() {
        let result = render("{{.Label}}");
        assert!(matches!(result, Err(TemplateError::BadCall { ref function, .. }) if function == "Label"));
    }

    #[test]
    fn test_index_of_non_map_fails_at_render() {
        let result = render(r#"{{index .Service.Name "x"}}"#);
        assert!(matches!(result, Err(TemplateError::BadCall { ref function, .. }) if function == "index"));
    }

    // =====================================================
    // Parse errors
    // =====================================================

    fn parse_offset(text: &str) -> usize {
        match Template::parse(text) {
            Err(TemplateError::Parse { offset, .. }) => offset,
            other => panic!("expected parse error for {text:?}, got {other:?}"),
        }
    }

    #[test]
    fn test_unclosed_action() {
        assert_eq!(parse_offset("web.{{.Service.Name"), 4);
    }

    #[test]
    fn test_empty_action() {
        assert_eq!(parse_offset("{{ }}"), 0);
    }

    #[test]
    fn test_unknown_function() {
        assert_eq!(parse_offset("a{{lower .Service.Name}}"), 1);
    }

    #[test]
    fn test_unterminated_string() {
        parse_offset(r#"{{.Label "app}}"#);
    }

    #[test]
    fn test_bad_field_path() {
        parse_offset("{{.Service.}}");
    }

    #[test]
    fn test_bare_dot() {
        parse_offset("{{.}}");
    }

    #[test]
    fn test_field_with_arguments() {
        parse_offset(r#"{{.Service.Name "x"}}"#);
    }

    #[test]
    fn test_index_wrong_arity() {
        parse_offset("{{index .Service.Labels}}");
    }

    #[test]
    fn test_string_constant_with_arguments() {
        parse_offset(r#"{{"a" "b"}}"#);
    }

    #[test]
    fn test_unexpected_character() {
        parse_offset("{{ .Service.Name | upper }}");
    }
}
